// Stateless resources: cluster, Fargate service, ECR repository, ALB with
// blue/green target groups, and the CodeDeploy deployment group that swaps
// traffic between them.
//
// The service registers with the blue target group exactly once. CodeDeploy
// owns moving it to green and back; declaring the attachment twice makes the
// service definition ambiguous.

use learn_infra_config::{DeployEnv, InfraStatus};
use serde_json::json;

use crate::blue_green::BlueGreenPolicy;
use crate::error::Result;
use crate::iam::Role;
use crate::stack::{AwsEnvironment, Stack};
use crate::stacks::network::VpcHandle;
use crate::template::fns::{get_att, join, reference};
use crate::template::{logical_id, DeletionPolicy, Output, Resource, Template};

pub const CONTAINER_NAME: &str = "backendContainer";
pub const CONTAINER_PORT: u16 = 8080;
pub const SERVICE_NAME: &str = "learn-backend-service";
pub const HEALTH_CHECK_PATH: &str = "/ping";
const STOP_TIMEOUT_SECS: u32 = 120;
const LOG_RETENTION_DAYS: u32 = 7;

/// Logical ids of the resources other code needs to find
#[derive(Debug, Clone)]
pub struct StatelessIds {
    pub cluster: String,
    pub service: String,
    pub repository: String,
    pub load_balancer: String,
    pub listener: String,
    pub blue_target_group: String,
    pub green_target_group: String,
    pub deployment_group: String,
}

impl StatelessIds {
    fn for_env(env: DeployEnv) -> Self {
        Self {
            cluster: logical_id(&format!("{}-cluster", env)),
            service: logical_id(&format!("{}-backend-service", env)),
            repository: logical_id(&format!("{}-Backend-ecrRepo", env)),
            load_balancer: logical_id(&format!("{}-alb", env)),
            listener: logical_id(&format!("{}-listener", env)),
            blue_target_group: logical_id(&format!("{}-tg-blue", env)),
            green_target_group: logical_id(&format!("{}-tg-green", env)),
            deployment_group: logical_id(&format!("{}-cd-deployment-group", env)),
        }
    }
}

pub struct StatelessStack {
    pub stack: Stack,
    pub ids: StatelessIds,
}

impl StatelessStack {
    pub fn build(
        name: &str,
        env: DeployEnv,
        aws_env: AwsEnvironment,
        vpc: &VpcHandle,
        infra_status: InfraStatus,
    ) -> Result<Self> {
        Self::build_with_policy(name, env, aws_env, vpc, infra_status, BlueGreenPolicy::default())
    }

    pub fn build_with_policy(
        name: &str,
        env: DeployEnv,
        aws_env: AwsEnvironment,
        vpc: &VpcHandle,
        infra_status: InfraStatus,
        policy: BlueGreenPolicy,
    ) -> Result<Self> {
        let ids = StatelessIds::for_env(env);
        let mut template = Template::new().with_description(format!(
            "learn stateless resources ({}): infra status {}",
            env, infra_status
        ));

        add_cluster_and_repository(&mut template, env, &ids)?;
        let task_definition = add_task_definition(&mut template, env, &ids)?;
        let (lb_sg, service_sg) = add_security_groups(&mut template, env, vpc)?;
        let listener_rule = add_load_balancer(&mut template, env, vpc, &ids, &lb_sg)?;

        template.add_resource(
            &ids.service,
            Resource::new(
                "AWS::ECS::Service",
                json!({
                    "Cluster": reference(&ids.cluster),
                    "ServiceName": SERVICE_NAME,
                    "TaskDefinition": reference(&task_definition),
                    "DesiredCount": infra_status.desired_count(),
                    "LaunchType": "FARGATE",
                    "DeploymentController": { "Type": "CODE_DEPLOY" },
                    "HealthCheckGracePeriodSeconds": 60,
                    "NetworkConfiguration": {
                        "AwsvpcConfiguration": {
                            "AssignPublicIp": "ENABLED",
                            "Subnets": vpc.public_subnet_ids(),
                            "SecurityGroups": [get_att(&service_sg, "GroupId")],
                        },
                    },
                    "LoadBalancers": [{
                        "ContainerName": CONTAINER_NAME,
                        "ContainerPort": CONTAINER_PORT,
                        "TargetGroupArn": reference(&ids.blue_target_group),
                    }],
                }),
            )
            .depends_on(listener_rule),
        )?;

        add_deployment_group(&mut template, env, &ids, &policy)?;

        template.add_output(
            "LoadBalancerDnsName",
            Output::new(get_att(&ids.load_balancer, "DNSName")),
        )?;
        template.add_output(
            "RepositoryUri",
            Output::new(get_att(&ids.repository, "RepositoryUri")),
        )?;

        Ok(Self {
            stack: Stack::new(name, aws_env, template),
            ids,
        })
    }
}

fn add_cluster_and_repository(
    template: &mut Template,
    env: DeployEnv,
    ids: &StatelessIds,
) -> Result<()> {
    template.add_resource(
        &ids.cluster,
        Resource::new(
            "AWS::ECS::Cluster",
            json!({
                "ClusterName": format!("learn-cluster-{}", env),
                "CapacityProviders": ["FARGATE", "FARGATE_SPOT"],
            }),
        ),
    )?;

    template.add_resource(
        &ids.repository,
        Resource::new(
            "AWS::ECR::Repository",
            json!({ "RepositoryName": format!("backend-{}", env) }),
        )
        .with_removal_policy(DeletionPolicy::Delete),
    )?;
    Ok(())
}

/// Returns the task definition's logical id
fn add_task_definition(template: &mut Template, env: DeployEnv, ids: &StatelessIds) -> Result<String> {
    let task_id = logical_id(&format!("{}-Backend-taskDef", env));
    let execution_role_id = format!("{}ExecutionRole", task_id);
    let log_group_id = format!("{}LogGroup", task_id);

    template.add_resource(
        &execution_role_id,
        Role::for_service("ecs-tasks.amazonaws.com")
            .managed_policy("service-role/AmazonECSTaskExecutionRolePolicy")
            .into_resource(),
    )?;

    template.add_resource(
        &log_group_id,
        Resource::new(
            "AWS::Logs::LogGroup",
            json!({
                "LogGroupName": format!("/ecs/{}-backend", env),
                "RetentionInDays": LOG_RETENTION_DAYS,
            }),
        )
        .with_removal_policy(DeletionPolicy::Delete),
    )?;

    template.add_resource(
        &task_id,
        Resource::new(
            "AWS::ECS::TaskDefinition",
            json!({
                "Family": format!("{}-backend", env),
                "Cpu": "256",
                "Memory": "512",
                "NetworkMode": "awsvpc",
                "RequiresCompatibilities": ["FARGATE"],
                "ExecutionRoleArn": get_att(&execution_role_id, "Arn"),
                "ContainerDefinitions": [{
                    "Name": CONTAINER_NAME,
                    "Image": join("", vec![get_att(&ids.repository, "RepositoryUri"), json!(":latest")]),
                    "Essential": true,
                    "PortMappings": [{ "ContainerPort": CONTAINER_PORT, "Protocol": "tcp" }],
                    "StopTimeout": STOP_TIMEOUT_SECS,
                    "LogConfiguration": {
                        "LogDriver": "awslogs",
                        "Options": {
                            "awslogs-group": reference(&log_group_id),
                            "awslogs-region": reference("AWS::Region"),
                            "awslogs-stream-prefix": "backend",
                        },
                    },
                }],
            }),
        ),
    )?;

    Ok(task_id)
}

/// Returns (load balancer SG id, service SG id)
fn add_security_groups(
    template: &mut Template,
    env: DeployEnv,
    vpc: &VpcHandle,
) -> Result<(String, String)> {
    let lb_sg = logical_id(&format!("{}-learn-LoadBalancerSecurityGroup", env));
    let service_sg = logical_id(&format!("{}-backend-service-SecurityGroup", env));

    template.add_resource(
        &lb_sg,
        Resource::new(
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": format!("{} learn load balancer", env),
                "VpcId": vpc.vpc_id(),
                "SecurityGroupIngress": [{
                    "IpProtocol": "tcp",
                    "FromPort": 80,
                    "ToPort": 80,
                    "CidrIp": "0.0.0.0/0",
                    "Description": "Allow inbound traffic on port 80",
                }],
                "SecurityGroupEgress": [{
                    "IpProtocol": "-1",
                    "CidrIp": "0.0.0.0/0",
                    "Description": "Allow all outbound traffic by default",
                }],
            }),
        ),
    )?;

    template.add_resource(
        &service_sg,
        Resource::new(
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": format!("{} learn backend service", env),
                "VpcId": vpc.vpc_id(),
                "SecurityGroupIngress": [{
                    "IpProtocol": "tcp",
                    "FromPort": CONTAINER_PORT,
                    "ToPort": CONTAINER_PORT,
                    "SourceSecurityGroupId": get_att(&lb_sg, "GroupId"),
                    "Description": "Load balancer to target",
                }],
                "SecurityGroupEgress": [{
                    "IpProtocol": "-1",
                    "CidrIp": "0.0.0.0/0",
                    "Description": "Allow all outbound traffic by default",
                }],
            }),
        ),
    )?;

    Ok((lb_sg, service_sg))
}

/// Returns the listener rule's logical id
fn add_load_balancer(
    template: &mut Template,
    env: DeployEnv,
    vpc: &VpcHandle,
    ids: &StatelessIds,
    lb_sg: &str,
) -> Result<String> {
    template.add_resource(
        &ids.load_balancer,
        Resource::new(
            "AWS::ElasticLoadBalancingV2::LoadBalancer",
            json!({
                "Name": format!("{}-learn-alb", env),
                "Scheme": "internet-facing",
                "Type": "application",
                "Subnets": vpc.public_subnet_ids(),
                "SecurityGroups": [get_att(lb_sg, "GroupId")],
            }),
        ),
    )?;

    template.add_resource(
        &ids.listener,
        Resource::new(
            "AWS::ElasticLoadBalancingV2::Listener",
            json!({
                "LoadBalancerArn": reference(&ids.load_balancer),
                "Port": 80,
                "Protocol": "HTTP",
                "DefaultActions": [{
                    "Type": "fixed-response",
                    "FixedResponseConfig": {
                        "StatusCode": "200",
                        "ContentType": "text/plain",
                        "MessageBody": "Default response",
                    },
                }],
            }),
        ),
    )?;

    for tg in [&ids.blue_target_group, &ids.green_target_group] {
        template.add_resource(
            tg,
            Resource::new(
                "AWS::ElasticLoadBalancingV2::TargetGroup",
                json!({
                    "Port": CONTAINER_PORT,
                    "Protocol": "HTTP",
                    "TargetType": "ip",
                    "VpcId": vpc.vpc_id(),
                    "HealthCheckPath": HEALTH_CHECK_PATH,
                }),
            ),
        )?;
    }

    let rule_id = logical_id(&format!("{}-listener-tg", env));
    template.add_resource(
        &rule_id,
        Resource::new(
            "AWS::ElasticLoadBalancingV2::ListenerRule",
            json!({
                "ListenerArn": reference(&ids.listener),
                "Priority": 1,
                "Conditions": [{
                    "Field": "host-header",
                    "HostHeaderConfig": { "Values": [env.config().domain_name] },
                }],
                "Actions": [{
                    "Type": "forward",
                    "TargetGroupArn": reference(&ids.blue_target_group),
                }],
            }),
        ),
    )?;

    Ok(rule_id)
}

fn add_deployment_group(
    template: &mut Template,
    env: DeployEnv,
    ids: &StatelessIds,
    policy: &BlueGreenPolicy,
) -> Result<()> {
    let app_id = logical_id(&format!("{}-cd-app", env));
    let role_id = format!("{}ServiceRole", ids.deployment_group);

    template.add_resource(
        &app_id,
        Resource::new(
            "AWS::CodeDeploy::Application",
            json!({
                "ApplicationName": format!("{}-ecs-codedeploy-app", env),
                "ComputePlatform": "ECS",
            }),
        ),
    )?;

    template.add_resource(
        &role_id,
        Role::for_service("codedeploy.amazonaws.com")
            .managed_policy("AWSCodeDeployRoleForECS")
            .into_resource(),
    )?;

    template.add_resource(
        &ids.deployment_group,
        Resource::new(
            "AWS::CodeDeploy::DeploymentGroup",
            json!({
                "ApplicationName": reference(&app_id),
                "DeploymentGroupName": format!("{}-ecs-deployment-group", env),
                "ServiceRoleArn": get_att(&role_id, "Arn"),
                "DeploymentConfigName": policy.traffic_shift.deployment_config_name(),
                "DeploymentStyle": {
                    "DeploymentType": "BLUE_GREEN",
                    "DeploymentOption": "WITH_TRAFFIC_CONTROL",
                },
                "BlueGreenDeploymentConfiguration": policy.blue_green_configuration(),
                "AutoRollbackConfiguration": policy.auto_rollback_configuration(),
                "ECSServices": [{
                    "ClusterName": reference(&ids.cluster),
                    "ServiceName": get_att(&ids.service, "Name"),
                }],
                "LoadBalancerInfo": {
                    "TargetGroupPairInfoList": [{
                        "TargetGroups": [
                            { "Name": get_att(&ids.blue_target_group, "TargetGroupName") },
                            { "Name": get_att(&ids.green_target_group, "TargetGroupName") },
                        ],
                        "ProdTrafficRoute": { "ListenerArns": [reference(&ids.listener)] },
                    }],
                },
            }),
        ),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::network::NetworkStack;

    fn synthesize(infra_status: InfraStatus) -> StatelessStack {
        let aws_env = AwsEnvironment {
            account: Some("111111111111".to_string()),
            region: "us-east-1".to_string(),
        };
        let network = NetworkStack::build(
            &format!("NetworkStack-{}", infra_status),
            DeployEnv::Dev,
            aws_env.clone(),
        )
        .unwrap();
        StatelessStack::build(
            &format!("Stateless-{}", infra_status),
            DeployEnv::Dev,
            aws_env,
            &network.vpc,
            infra_status,
        )
        .unwrap()
    }

    fn service_desired_count(stack: &StatelessStack) -> u64 {
        let (_, service) = stack
            .stack
            .template()
            .resources_of_type("AWS::ECS::Service")
            .next()
            .unwrap();
        service.properties["DesiredCount"].as_u64().unwrap()
    }

    #[test]
    fn test_desired_count_is_one_when_on() {
        assert_eq!(service_desired_count(&synthesize(InfraStatus::On)), 1);
    }

    #[test]
    fn test_desired_count_is_zero_when_off() {
        assert_eq!(service_desired_count(&synthesize(InfraStatus::Off)), 0);
    }

    #[test]
    fn test_template_references_resolve() {
        let stateless = synthesize(InfraStatus::On);
        assert!(stateless.stack.validate().is_ok());
    }

    #[test]
    fn test_service_attaches_to_blue_once() {
        let stateless = synthesize(InfraStatus::On);
        let template = stateless.stack.template();
        let service = template.resource(&stateless.ids.service).unwrap();

        let attachments = service.properties["LoadBalancers"].as_array().unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(
            attachments[0]["TargetGroupArn"],
            reference(&stateless.ids.blue_target_group)
        );
        assert_eq!(service.properties["DeploymentController"]["Type"], "CODE_DEPLOY");
        assert_eq!(
            template.resources_of_type("AWS::ElasticLoadBalancingV2::TargetGroup").count(),
            2
        );
    }

    #[test]
    fn test_deployment_group_is_blue_green_with_rollback() {
        let stateless = synthesize(InfraStatus::On);
        let group = stateless
            .stack
            .template()
            .resource(&stateless.ids.deployment_group)
            .unwrap();
        let props = &group.properties;
        assert_eq!(props["DeploymentGroupName"], "dev-ecs-deployment-group");
        assert_eq!(props["DeploymentConfigName"], "CodeDeployDefault.ECSAllAtOnce");
        assert_eq!(props["AutoRollbackConfiguration"]["Enabled"], true);
        let groups = &props["LoadBalancerInfo"]["TargetGroupPairInfoList"][0]["TargetGroups"];
        assert_eq!(groups.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_listener_and_host_rule() {
        let stateless = synthesize(InfraStatus::On);
        let template = stateless.stack.template();
        let listener = template.resource(&stateless.ids.listener).unwrap();
        assert_eq!(
            listener.properties["DefaultActions"][0]["FixedResponseConfig"]["MessageBody"],
            "Default response"
        );
        let (_, rule) = template
            .resources_of_type("AWS::ElasticLoadBalancingV2::ListenerRule")
            .next()
            .unwrap();
        assert_eq!(rule.properties["Priority"], 1);
        assert_eq!(
            rule.properties["Conditions"][0]["HostHeaderConfig"]["Values"][0],
            "dev-api.learn.com"
        );
    }

    #[test]
    fn test_repository_is_destroyed_with_stack() {
        let stateless = synthesize(InfraStatus::Off);
        let repo = stateless
            .stack
            .template()
            .resource(&stateless.ids.repository)
            .unwrap();
        assert_eq!(repo.properties["RepositoryName"], "backend-dev");
        assert_eq!(repo.deletion_policy, Some(DeletionPolicy::Delete));
    }
}
