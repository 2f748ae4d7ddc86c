// Pipeline trigger function for one environment
//
// Writes the environment's infra status flag and starts the pipeline. The
// role may touch exactly one parameter and one pipeline.

use learn_infra_config::{AssetSettings, DeployEnv};
use serde_json::{json, Value};

use crate::error::Result;
use crate::iam::{PolicyStatement, Role};
use crate::stacks::backend::{LAMBDA_ARCHITECTURE, LAMBDA_HANDLER, LAMBDA_RUNTIME};
use crate::template::fns::{get_att, reference, ssm_parameter_arn, sub};
use crate::template::{logical_id, DeletionPolicy, Resource, Template};

pub const TRIGGER_ARTIFACT: &str = "pipeline-trigger";
pub const TRIGGER_TIMEOUT_SECS: u32 = 300;
pub const TRIGGER_LOG_RETENTION_DAYS: u32 = 7;

#[derive(Debug, Clone)]
pub struct TriggerFunction {
    pub env: DeployEnv,
    pub function_id: String,
    pub role_id: String,
}

/// ARN of the pipeline declared as `pipeline_id` in the same template
pub fn pipeline_arn(pipeline_id: &str) -> Value {
    sub(format!(
        "arn:${{AWS::Partition}}:codepipeline:${{AWS::Region}}:${{AWS::AccountId}}:${{{}}}",
        pipeline_id
    ))
}

/// Least-privilege statements for the trigger role
pub fn trigger_statements(env: DeployEnv, pipeline_id: &str) -> Vec<PolicyStatement> {
    vec![
        PolicyStatement::allow()
            .actions([
                "codepipeline:StartPipelineExecution",
                "codepipeline:GetPipelineState",
            ])
            .resources([pipeline_arn(pipeline_id)]),
        PolicyStatement::allow()
            .actions(["ssm:PutParameter", "ssm:GetParameter"])
            .resources([ssm_parameter_arn(env.infra_status_parameter())]),
    ]
}

pub fn add_trigger_function(
    template: &mut Template,
    env: DeployEnv,
    pipeline_id: &str,
    assets: &AssetSettings,
) -> Result<TriggerFunction> {
    let function_name = format!("pipeline-trigger-{}", env);
    let function_id = logical_id(&format!("cdkpipeline-trigger-{}", env));
    let role_id = format!("{}ServiceRole", function_id);
    let log_group_id = format!("{}LogGroup", function_id);

    template.add_resource(
        &role_id,
        Role::for_service("lambda.amazonaws.com")
            .managed_policy("service-role/AWSLambdaBasicExecutionRole")
            .inline_policy(
                format!("{}DefaultPolicy", function_id),
                trigger_statements(env, pipeline_id),
            )
            .into_resource(),
    )?;

    template.add_resource(
        &log_group_id,
        Resource::new(
            "AWS::Logs::LogGroup",
            json!({
                "LogGroupName": format!("/aws/lambda/{}", function_name),
                "RetentionInDays": TRIGGER_LOG_RETENTION_DAYS,
            }),
        )
        .with_removal_policy(DeletionPolicy::Retain),
    )?;

    template.add_resource(
        &function_id,
        Resource::new(
            "AWS::Lambda::Function",
            json!({
                "FunctionName": function_name,
                "Runtime": LAMBDA_RUNTIME,
                "Handler": LAMBDA_HANDLER,
                "Architectures": [LAMBDA_ARCHITECTURE],
                "Timeout": TRIGGER_TIMEOUT_SECS,
                "Role": get_att(&role_id, "Arn"),
                "Code": {
                    "S3Bucket": assets.bucket,
                    "S3Key": assets.key_for(TRIGGER_ARTIFACT),
                },
                "Environment": {
                    "Variables": {
                        "PIPELINE_NAME": reference(pipeline_id),
                        "SSM_PARAMETER_NAME": env.infra_status_parameter(),
                        "DEPLOY_ENV": env.as_str(),
                    },
                },
            }),
        )
        .depends_on(&role_id)
        .depends_on(&log_group_id),
    )?;

    Ok(TriggerFunction {
        env,
        function_id,
        role_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_scoped() {
        let statements = trigger_statements(DeployEnv::Stg, "Pipeline");
        assert!(statements[0].allows("codepipeline:StartPipelineExecution"));
        assert_eq!(statements[0].resources, vec![pipeline_arn("Pipeline")]);
        assert!(statements[1].allows("ssm:PutParameter"));
        assert!(statements[1].resources[0]["Fn::Sub"]
            .as_str()
            .unwrap()
            .ends_with("parameter/cdk/learn/infraStatusStg"));
        assert!(!statements.iter().any(|s| s.resources.contains(&json!("*"))));
    }

    #[test]
    fn test_function_environment() {
        let mut template = Template::new();
        template
            .add_resource(
                "Pipeline",
                Resource::new("AWS::CodePipeline::Pipeline", json!({})),
            )
            .unwrap();
        let trigger =
            add_trigger_function(&mut template, DeployEnv::Dev, "Pipeline", &AssetSettings::default())
                .unwrap();
        assert!(template.validate().is_ok());

        let function = template.resource(&trigger.function_id).unwrap();
        let vars = &function.properties["Environment"]["Variables"];
        assert_eq!(vars["PIPELINE_NAME"], json!({ "Ref": "Pipeline" }));
        assert_eq!(vars["SSM_PARAMETER_NAME"], "/cdk/learn/infraStatusDev");
        assert_eq!(vars["DEPLOY_ENV"], "dev");
        assert_eq!(function.properties["Timeout"], 300);
        assert_eq!(function.properties["FunctionName"], "pipeline-trigger-dev");

        let (_, logs) = template.resources_of_type("AWS::Logs::LogGroup").next().unwrap();
        assert_eq!(logs.properties["RetentionInDays"], 7);
    }
}
