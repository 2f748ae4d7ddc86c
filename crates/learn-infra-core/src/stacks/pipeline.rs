// Pipeline stack: the self-contained CodePipeline V2 that synthesizes the
// assembly and deploys every stage, plus the trigger functions that start it.

use learn_infra_config::Settings;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::iam::{PolicyStatement, Role};
use crate::pipeline::synth_step::{buildspec, synth_commands, synth_role_statements};
use crate::pipeline::{PipelineDefinition, PipelineStage, PreStep, StageKind};
use crate::stack::{AwsEnvironment, Stack};
use crate::stacks::trigger::{add_trigger_function, pipeline_arn, TriggerFunction};
use crate::stage::AppStage;
use crate::template::fns::{get_att, reference, sub};
use crate::template::{DeletionPolicy, Output, Resource, Template};

pub const PIPELINE_STACK_NAME: &str = "code-pipeline";

const PIPELINE_ID: &str = "Pipeline";
const ARTIFACT_BUCKET_ID: &str = "ArtifactsBucket";
const PIPELINE_ROLE_ID: &str = "PipelineRole";
const DEPLOY_ROLE_ID: &str = "CloudFormationDeployRole";
const SYNTH_PROJECT_ID: &str = "SynthProject";
const SYNTH_ROLE_ID: &str = "SynthProjectRole";

const SOURCE_ARTIFACT: &str = "Source";
const SYNTH_ARTIFACT: &str = "Synth_Output";
const BUILD_IMAGE: &str = "aws/codebuild/amazonlinux2-x86_64-standard:5.0";

pub struct PipelineStack {
    pub stack: Stack,
    pub definition: PipelineDefinition,
    pub triggers: Vec<TriggerFunction>,
}

impl PipelineStack {
    pub fn build(settings: &Settings, stages: &[AppStage]) -> Result<Self> {
        let definition = PipelineDefinition::standard(settings);
        let mut template = Template::new().with_description(format!(
            "learn delivery pipeline {}",
            definition.name
        ));

        template.add_resource(
            ARTIFACT_BUCKET_ID,
            Resource::new(
                "AWS::S3::Bucket",
                json!({
                    "BucketEncryption": {
                        "ServerSideEncryptionConfiguration": [{
                            "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" },
                        }],
                    },
                    "PublicAccessBlockConfiguration": {
                        "BlockPublicAcls": true,
                        "BlockPublicPolicy": true,
                        "IgnorePublicAcls": true,
                        "RestrictPublicBuckets": true,
                    },
                }),
            )
            .with_removal_policy(DeletionPolicy::Retain),
        )?;

        template.add_resource(
            DEPLOY_ROLE_ID,
            Role::for_service("cloudformation.amazonaws.com")
                .managed_policy("AdministratorAccess")
                .into_resource(),
        )?;

        add_synth_project(&mut template, settings)?;
        add_pipeline_role(&mut template, settings)?;

        let rendered_stages = render_stages(&definition, settings, stages)?;
        let variables: Vec<Value> = definition
            .variables
            .iter()
            .map(|v| {
                json!({
                    "Name": v.name,
                    "DefaultValue": v.default_value,
                    "Description": v.description,
                })
            })
            .collect();
        template.add_resource(
            PIPELINE_ID,
            Resource::new(
                "AWS::CodePipeline::Pipeline",
                json!({
                    "Name": definition.name,
                    "PipelineType": "V2",
                    "RestartExecutionOnUpdate": true,
                    "RoleArn": get_att(PIPELINE_ROLE_ID, "Arn"),
                    "ArtifactStore": { "Type": "S3", "Location": reference(ARTIFACT_BUCKET_ID) },
                    "Variables": variables,
                    "Triggers": [{
                        "ProviderType": "CodeStarSourceConnection",
                        "GitConfiguration": {
                            "SourceActionName": SOURCE_ARTIFACT,
                            "Push": [{ "Branches": { "Includes": [settings.source.branch] } }],
                        },
                    }],
                    "Stages": rendered_stages,
                }),
            )
            .depends_on(PIPELINE_ROLE_ID),
        )?;

        let mut triggers = Vec::new();
        for stage in stages.iter().filter(|s| s.env().has_trigger()) {
            triggers.push(add_trigger_function(
                &mut template,
                stage.env(),
                PIPELINE_ID,
                &settings.assets,
            )?);
        }

        template.add_output(
            "PipelineName",
            Output::new(reference(PIPELINE_ID)).description("Name of the delivery pipeline"),
        )?;
        template.add_output("PipelineArn", Output::new(pipeline_arn(PIPELINE_ID)))?;
        for trigger in &triggers {
            template.add_output(
                format!("{}Arn", trigger.function_id),
                Output::new(get_att(&trigger.function_id, "Arn")),
            )?;
        }

        Ok(Self {
            stack: Stack::new(
                PIPELINE_STACK_NAME,
                AwsEnvironment::from_settings(settings),
                template,
            ),
            definition,
            triggers,
        })
    }
}

fn add_synth_project(template: &mut Template, settings: &Settings) -> Result<()> {
    let mut statements = vec![
        PolicyStatement::allow()
            .actions(["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"])
            .resources([sub("arn:${AWS::Partition}:logs:${AWS::Region}:${AWS::AccountId}:log-group:/aws/codebuild/*")]),
        PolicyStatement::allow()
            .actions(["s3:GetObject*", "s3:GetBucket*", "s3:List*", "s3:PutObject", "s3:DeleteObject*", "s3:Abort*"])
            .resources([
                get_att(ARTIFACT_BUCKET_ID, "Arn"),
                sub(format!("${{{}.Arn}}/*", ARTIFACT_BUCKET_ID)),
            ]),
    ];
    statements.extend(synth_role_statements());

    if let Some(bucket) = &settings.pipeline.assembly_bucket {
        statements.push(
            PolicyStatement::allow()
                .actions(["s3:PutObject", "s3:DeleteObject", "s3:ListBucket"])
                .resources([
                    json!(format!("arn:aws:s3:::{}", bucket)),
                    json!(format!("arn:aws:s3:::{}/*", bucket)),
                ]),
        );
    }

    template.add_resource(
        SYNTH_ROLE_ID,
        Role::for_service("codebuild.amazonaws.com")
            .inline_policy("SynthProjectPolicy", statements)
            .into_resource(),
    )?;

    let spec = serde_json::to_string_pretty(&buildspec(&synth_commands(settings)))?;
    template.add_resource(
        SYNTH_PROJECT_ID,
        Resource::new(
            "AWS::CodeBuild::Project",
            json!({
                "Name": format!("{}-synth", settings.pipeline.name),
                "ServiceRole": get_att(SYNTH_ROLE_ID, "Arn"),
                "Source": {
                    "Type": "CODEPIPELINE",
                    "BuildSpec": spec,
                },
                "Artifacts": { "Type": "CODEPIPELINE" },
                "Environment": {
                    "Type": "LINUX_CONTAINER",
                    "ComputeType": "BUILD_GENERAL1_MEDIUM",
                    "Image": BUILD_IMAGE,
                    "EnvironmentVariables": [
                        { "Name": "LEARN_INFRA_LOG_FORMAT", "Type": "PLAINTEXT", "Value": "json" },
                    ],
                },
            }),
        ),
    )?;
    Ok(())
}

fn add_pipeline_role(template: &mut Template, settings: &Settings) -> Result<()> {
    let mut statements = vec![
        PolicyStatement::allow()
            .actions(["s3:GetObject*", "s3:GetBucket*", "s3:List*", "s3:PutObject", "s3:DeleteObject*", "s3:Abort*"])
            .resources([
                get_att(ARTIFACT_BUCKET_ID, "Arn"),
                sub(format!("${{{}.Arn}}/*", ARTIFACT_BUCKET_ID)),
            ]),
        PolicyStatement::allow()
            .actions(["codebuild:StartBuild", "codebuild:BatchGetBuilds", "codebuild:StopBuild"])
            .resources([get_att(SYNTH_PROJECT_ID, "Arn")]),
        PolicyStatement::allow()
            .actions([
                "cloudformation:CreateStack",
                "cloudformation:DescribeStacks",
                "cloudformation:UpdateStack",
                "cloudformation:DeleteStack",
                "cloudformation:CreateChangeSet",
                "cloudformation:DescribeChangeSet",
                "cloudformation:ExecuteChangeSet",
                "cloudformation:DeleteChangeSet",
            ])
            .any_resource(),
        PolicyStatement::allow()
            .actions(["iam:PassRole"])
            .resources([get_att(DEPLOY_ROLE_ID, "Arn")]),
    ];
    if !settings.source.connection_arn.is_empty() {
        statements.push(
            PolicyStatement::allow()
                .actions(["codestar-connections:UseConnection", "codeconnections:UseConnection"])
                .resources([json!(settings.source.connection_arn)]),
        );
    }

    template.add_resource(
        PIPELINE_ROLE_ID,
        Role::for_service("codepipeline.amazonaws.com")
            .inline_policy("PipelineRolePolicy", statements)
            .into_resource(),
    )?;
    Ok(())
}

fn render_stages(
    definition: &PipelineDefinition,
    settings: &Settings,
    app_stages: &[AppStage],
) -> Result<Vec<Value>> {
    let by_env: BTreeMap<_, _> = app_stages.iter().map(|s| (s.env(), s)).collect();

    let mut rendered = Vec::new();
    for stage in &definition.stages {
        let actions = match stage.kind {
            StageKind::Source => vec![source_action(settings)],
            StageKind::Synth => vec![synth_action()],
            StageKind::UpdatePipeline => vec![self_update_action()],
            StageKind::Deploy(env) => match by_env.get(&env) {
                Some(app_stage) => deploy_actions(stage, app_stage)?,
                // Environment not part of this assembly
                None => continue,
            },
        };

        let mut value = json!({ "Name": stage.name, "Actions": actions });
        if let Some(guard) = &stage.guard {
            value["BeforeEntry"] = guard.to_condition();
        }
        rendered.push(value);
    }
    Ok(rendered)
}

fn source_action(settings: &Settings) -> Value {
    json!({
        "Name": SOURCE_ARTIFACT,
        "ActionTypeId": {
            "Category": "Source",
            "Owner": "AWS",
            "Provider": "CodeStarSourceConnection",
            "Version": "1",
        },
        "Configuration": {
            "ConnectionArn": settings.source.connection_arn,
            "FullRepositoryId": settings.source.repository,
            "BranchName": settings.source.branch,
        },
        "OutputArtifacts": [{ "Name": SOURCE_ARTIFACT }],
        "RunOrder": 1,
    })
}

fn synth_action() -> Value {
    json!({
        "Name": "Synth",
        "ActionTypeId": {
            "Category": "Build",
            "Owner": "AWS",
            "Provider": "CodeBuild",
            "Version": "1",
        },
        "Configuration": { "ProjectName": reference(SYNTH_PROJECT_ID) },
        "InputArtifacts": [{ "Name": SOURCE_ARTIFACT }],
        "OutputArtifacts": [{ "Name": SYNTH_ARTIFACT }],
        "RunOrder": 1,
    })
}

/// Redeploys this stack from the synthesized template. A changed pipeline
/// restarts the execution (`RestartExecutionOnUpdate`).
fn self_update_action() -> Value {
    cloudformation_deploy_action(
        "SelfMutate",
        PIPELINE_STACK_NAME,
        &format!("{}.template.json", PIPELINE_STACK_NAME),
        1,
    )
}

fn cloudformation_deploy_action(
    name: &str,
    stack_name: &str,
    template_file: &str,
    run_order: u32,
) -> Value {
    json!({
        "Name": name,
        "ActionTypeId": {
            "Category": "Deploy",
            "Owner": "AWS",
            "Provider": "CloudFormation",
            "Version": "1",
        },
        "Configuration": {
            "ActionMode": "CREATE_UPDATE",
            "StackName": stack_name,
            "TemplatePath": format!("{}::{}", SYNTH_ARTIFACT, template_file),
            "RoleArn": get_att(DEPLOY_ROLE_ID, "Arn"),
            "Capabilities": "CAPABILITY_NAMED_IAM,CAPABILITY_AUTO_EXPAND",
        },
        "InputArtifacts": [{ "Name": SYNTH_ARTIFACT }],
        "RunOrder": run_order,
    })
}

/// Approvals run first; each dependency wave of stacks gets the next run order
fn deploy_actions(stage: &PipelineStage, app_stage: &AppStage) -> Result<Vec<Value>> {
    let mut actions = Vec::new();
    let mut run_order = 1u32;

    if !stage.pre.is_empty() {
        for step in &stage.pre {
            let PreStep::ManualApproval {
                name,
                comment,
                review_url,
            } = step;
            actions.push(json!({
                "Name": name,
                "ActionTypeId": {
                    "Category": "Approval",
                    "Owner": "AWS",
                    "Provider": "Manual",
                    "Version": "1",
                },
                "Configuration": {
                    "CustomData": comment,
                    "ExternalEntityLink": review_url,
                },
                "RunOrder": run_order,
            }));
        }
        run_order += 1;
    }

    for wave in app_stage.waves()? {
        for stack in wave {
            actions.push(cloudformation_deploy_action(
                &format!("{}.Deploy", stack.name()),
                stack.name(),
                &stack.template_file(),
                run_order,
            ));
        }
        run_order += 1;
    }
    Ok(actions)
}
