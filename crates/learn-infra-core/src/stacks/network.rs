// Network stack: one VPC per environment
//
// Two AZs, each with a public and a private /24. No NAT gateways, so the
// private route tables carry no default route; anything that needs the
// internet (the Fargate service) runs in the public subnets with a public IP.

use learn_infra_config::DeployEnv;
use serde_json::{json, Value};

use crate::cidr::Ipv4Cidr;
use crate::error::Result;
use crate::stack::{AwsEnvironment, Stack};
use crate::template::fns::{availability_zone, get_att, import_value, name_tag, reference};
use crate::template::{logical_id, Output, Resource, Template};

pub const MAX_AZS: u32 = 2;
pub const SUBNET_MASK: u8 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetKind {
    Public,
    Private,
}

impl SubnetKind {
    fn label(&self) -> &'static str {
        match self {
            SubnetKind::Public => "Public",
            SubnetKind::Private => "Private",
        }
    }
}

/// Cross-stack handle to a VPC, resolved through CloudFormation exports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcHandle {
    pub stack_name: String,
    pub cidr_block: String,
    vpc_id_export: String,
    public_subnet_exports: Vec<String>,
    private_subnet_exports: Vec<String>,
}

impl VpcHandle {
    pub fn vpc_id(&self) -> Value {
        import_value(&self.vpc_id_export)
    }

    pub fn public_subnet_ids(&self) -> Value {
        Value::Array(self.public_subnet_exports.iter().map(import_value).collect())
    }

    pub fn private_subnet_ids(&self) -> Value {
        Value::Array(self.private_subnet_exports.iter().map(import_value).collect())
    }

    pub fn export_names(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.vpc_id_export)
            .chain(self.public_subnet_exports.iter())
            .chain(self.private_subnet_exports.iter())
    }
}

pub struct NetworkStack {
    pub stack: Stack,
    pub vpc: VpcHandle,
}

impl NetworkStack {
    pub fn build(name: &str, env: DeployEnv, aws_env: AwsEnvironment) -> Result<Self> {
        let env_config = env.config();
        let cidr: Ipv4Cidr = env_config.cidr_block.parse()?;
        let vpc_name = format!("{}-learn-vpc", env);
        let vpc_id = logical_id(&vpc_name);

        let mut template = Template::new().with_description(format!(
            "learn network resources ({}): VPC {}",
            env, env_config.cidr_block
        ));

        template.add_resource(
            &vpc_id,
            Resource::new(
                "AWS::EC2::VPC",
                json!({
                    "CidrBlock": env_config.cidr_block,
                    "EnableDnsHostnames": true,
                    "EnableDnsSupport": true,
                    "InstanceTenancy": "default",
                    "Tags": name_tag(&vpc_name),
                }),
            ),
        )?;

        let igw_id = format!("{}IGW", vpc_id);
        let attachment_id = format!("{}VPCGW", vpc_id);
        template.add_resource(
            &igw_id,
            Resource::new(
                "AWS::EC2::InternetGateway",
                json!({ "Tags": name_tag(&vpc_name) }),
            ),
        )?;
        template.add_resource(
            &attachment_id,
            Resource::new(
                "AWS::EC2::VPCGatewayAttachment",
                json!({
                    "VpcId": reference(&vpc_id),
                    "InternetGatewayId": reference(&igw_id),
                }),
            ),
        )?;

        // Subnet blocks: public subnets first, then private
        let mut block_index = 0u32;
        let mut subnets: Vec<(SubnetKind, String)> = Vec::new();
        for kind in [SubnetKind::Public, SubnetKind::Private] {
            for az in 0..MAX_AZS {
                let subnet_cidr = cidr.subnet(SUBNET_MASK, block_index)?;
                block_index += 1;

                let subnet_id = format!("{}{}Subnet{}", vpc_id, kind.label(), az + 1);
                let subnet_name = format!(
                    "{}/{}Subnet{}",
                    vpc_name,
                    kind.label().to_lowercase(),
                    az + 1
                );
                add_subnet(
                    &mut template,
                    &subnet_id,
                    &subnet_name,
                    &vpc_id,
                    kind,
                    az,
                    &subnet_cidr,
                    &igw_id,
                    &attachment_id,
                )?;
                subnets.push((kind, subnet_id));
            }
        }

        let vpc_id_export = format!("{}-VpcId", name);
        template.add_output(
            "VpcId",
            Output::new(reference(&vpc_id))
                .description(format!("{} VPC id", env))
                .export_as(&vpc_id_export),
        )?;
        template.add_output(
            "VpcCidrBlock",
            Output::new(get_att(&vpc_id, "CidrBlock")),
        )?;

        let mut public_subnet_exports = Vec::new();
        let mut private_subnet_exports = Vec::new();
        for (kind, subnet_id) in &subnets {
            let export = format!("{}-{}", name, subnet_id);
            template.add_output(
                subnet_id.clone(),
                Output::new(reference(subnet_id)).export_as(&export),
            )?;
            match kind {
                SubnetKind::Public => public_subnet_exports.push(export),
                SubnetKind::Private => private_subnet_exports.push(export),
            }
        }

        let vpc = VpcHandle {
            stack_name: name.to_string(),
            cidr_block: env_config.cidr_block.to_string(),
            vpc_id_export,
            public_subnet_exports,
            private_subnet_exports,
        };

        Ok(Self {
            stack: Stack::new(name, aws_env, template),
            vpc,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn add_subnet(
    template: &mut Template,
    subnet_id: &str,
    subnet_name: &str,
    vpc_id: &str,
    kind: SubnetKind,
    az: u32,
    cidr: &Ipv4Cidr,
    igw_id: &str,
    attachment_id: &str,
) -> Result<()> {
    template.add_resource(
        subnet_id,
        Resource::new(
            "AWS::EC2::Subnet",
            json!({
                "VpcId": reference(vpc_id),
                "AvailabilityZone": availability_zone(az as usize),
                "CidrBlock": cidr.to_string(),
                "MapPublicIpOnLaunch": kind == SubnetKind::Public,
                "Tags": name_tag(subnet_name),
            }),
        ),
    )?;

    let route_table_id = format!("{}RouteTable", subnet_id);
    template.add_resource(
        &route_table_id,
        Resource::new(
            "AWS::EC2::RouteTable",
            json!({
                "VpcId": reference(vpc_id),
                "Tags": name_tag(subnet_name),
            }),
        ),
    )?;
    template.add_resource(
        format!("{}RouteTableAssociation", subnet_id),
        Resource::new(
            "AWS::EC2::SubnetRouteTableAssociation",
            json!({
                "RouteTableId": reference(&route_table_id),
                "SubnetId": reference(subnet_id),
            }),
        ),
    )?;

    if kind == SubnetKind::Public {
        template.add_resource(
            format!("{}DefaultRoute", subnet_id),
            Resource::new(
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": reference(&route_table_id),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "GatewayId": reference(igw_id),
                }),
            )
            .depends_on(attachment_id),
        )?;
    }

    Ok(())
}
