// Backend function stack: the joke proxy Lambda

use learn_infra_config::{AssetSettings, DeployEnv};
use serde_json::json;

use crate::error::Result;
use crate::iam::Role;
use crate::stack::{AwsEnvironment, Stack};
use crate::template::fns::get_att;
use crate::template::{logical_id, Output, Resource, Template};

pub const BACKEND_ARTIFACT: &str = "backend";
pub(crate) const LAMBDA_RUNTIME: &str = "provided.al2023";
pub(crate) const LAMBDA_HANDLER: &str = "bootstrap";
pub(crate) const LAMBDA_ARCHITECTURE: &str = "arm64";

pub struct BackendFunctionStack {
    pub stack: Stack,
    pub function_id: String,
}

impl BackendFunctionStack {
    pub fn build(
        name: &str,
        env: DeployEnv,
        aws_env: AwsEnvironment,
        assets: &AssetSettings,
    ) -> Result<Self> {
        let function_id = logical_id("backend-function");
        let role_id = format!("{}ServiceRole", function_id);

        let mut template =
            Template::new().with_description(format!("learn backend function ({})", env));

        template.add_resource(
            &role_id,
            Role::for_service("lambda.amazonaws.com")
                .managed_policy("service-role/AWSLambdaBasicExecutionRole")
                .into_resource(),
        )?;

        template.add_resource(
            &function_id,
            Resource::new(
                "AWS::Lambda::Function",
                json!({
                    "FunctionName": format!("{}-backend-function", env),
                    "Runtime": LAMBDA_RUNTIME,
                    "Handler": LAMBDA_HANDLER,
                    "Architectures": [LAMBDA_ARCHITECTURE],
                    "Role": get_att(&role_id, "Arn"),
                    "Code": {
                        "S3Bucket": assets.bucket,
                        "S3Key": assets.key_for(BACKEND_ARTIFACT),
                    },
                    "Environment": { "Variables": { "TABLE_NAME": "test-table" } },
                }),
            )
            .depends_on(&role_id),
        )?;

        template.add_output(
            "BackendFunctionArn",
            Output::new(get_att(&function_id, "Arn")),
        )?;

        Ok(Self {
            stack: Stack::new(name, aws_env, template),
            function_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_function_properties() {
        let aws_env = AwsEnvironment {
            account: None,
            region: "us-east-1".to_string(),
        };
        let assets = AssetSettings::default();
        let backend =
            BackendFunctionStack::build("StgStage-BackendFunctionStack", DeployEnv::Stg, aws_env, &assets)
                .unwrap();
        assert!(backend.stack.validate().is_ok());

        let function = backend
            .stack
            .template()
            .resource(&backend.function_id)
            .unwrap();
        let props = &function.properties;
        assert_eq!(props["FunctionName"], "stg-backend-function");
        assert_eq!(props["Runtime"], "provided.al2023");
        assert_eq!(props["Handler"], "bootstrap");
        assert_eq!(props["Environment"]["Variables"]["TABLE_NAME"], "test-table");
        assert_eq!(props["Code"]["S3Key"], "lambda/backend.zip");
    }
}
