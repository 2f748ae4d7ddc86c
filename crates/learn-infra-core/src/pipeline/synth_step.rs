// The CodeBuild step that turns the repository into a cloud assembly

use learn_infra_config::{DeployEnv, Settings, ENV_SSM_PARAMETER};

use crate::iam::PolicyStatement;
use crate::template::fns::ssm_parameter_arn;

pub const ASSEMBLY_DIR: &str = "cdk.out";

/// Shell commands run by the synth project, in order
pub fn synth_commands(settings: &Settings) -> Vec<String> {
    let mut commands = vec![format!(
        "aws ssm get-parameter --with-decryption --name {} --output text --query 'Parameter.Value' > .env",
        ENV_SSM_PARAMETER
    )];

    // A missing flag means the environment stays on
    for env in DeployEnv::ALL {
        commands.push(format!(
            "{}=$(aws ssm get-parameter --name {} --output text --query 'Parameter.Value' 2>/dev/null || echo 'on')",
            env.infra_status_variable(),
            env.infra_status_parameter()
        ));
    }
    for env in DeployEnv::ALL {
        let var = env.infra_status_variable();
        commands.push(format!("echo \"{}: ${}\"", var, var));
    }

    commands.extend([
        "curl --proto '=https' --tlsv1.2 -sSf https://sh.rustup.rs | sh -s -- -y --profile minimal"
            .to_string(),
        ". \"$HOME/.cargo/env\"".to_string(),
        "set -a && . ./.env && set +a".to_string(),
        "cargo test --locked -p learn-infra-core".to_string(),
    ]);

    let status_flags: Vec<String> = DeployEnv::ALL
        .iter()
        .map(|env| format!("--infra-status-{} ${}", env, env.infra_status_variable()))
        .collect();
    commands.push(format!(
        "cargo run --release --locked --bin learn-infra -- synth --out {} {}",
        ASSEMBLY_DIR,
        status_flags.join(" ")
    ));

    if let Some(bucket) = &settings.pipeline.assembly_bucket {
        commands.push(format!(
            "aws s3 sync {} s3://{}/{}/$CODEBUILD_RESOLVED_SOURCE_VERSION --delete",
            ASSEMBLY_DIR, bucket, settings.pipeline.name
        ));
    }

    commands
}

/// Extra permissions for the synth project role
pub fn synth_role_statements() -> Vec<PolicyStatement> {
    let parameters = std::iter::once(ENV_SSM_PARAMETER)
        .chain(DeployEnv::ALL.iter().map(|env| env.infra_status_parameter()))
        .map(ssm_parameter_arn);

    vec![
        PolicyStatement::allow()
            .actions(["ssm:GetParameter*"])
            .resources(parameters),
        PolicyStatement::allow()
            .actions([
                "cloudformation:DescribeStacks",
                "cloudformation:GetTemplate",
                "cloudformation:ListStacks",
                "cloudformation:DescribeStackEvents",
                "cloudformation:DescribeStackResource",
                "cloudformation:DescribeStackResources",
                "cloudformation:GetTemplateSummary",
                "ecr:DescribeRepositories",
                "ecr:ListImages",
                "ecr:BatchGetImage",
                "ecr:GetDownloadUrlForLayer",
                "sts:AssumeRole",
            ])
            .any_resource(),
        PolicyStatement::allow()
            .actions([
                "iam:GetRole",
                "iam:GetRolePolicy",
                "iam:ListRolePolicies",
                "iam:ListAttachedRolePolicies",
            ])
            .any_resource(),
        PolicyStatement::allow()
            .actions(["ssm:GetParameter", "ssm:GetParameters"])
            .any_resource(),
    ]
}

/// CodeBuild buildspec wrapping `commands`
pub fn buildspec(commands: &[String]) -> serde_json::Value {
    serde_json::json!({
        "version": "0.2",
        "phases": { "build": { "commands": commands } },
        "artifacts": { "base-directory": ASSEMBLY_DIR, "files": "**/*" },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_read_flags_with_on_fallback() {
        let commands = synth_commands(&Settings::default());
        assert!(commands[0].ends_with("> .env"));
        assert!(commands[0].contains("/cdk/learn/env"));
        assert!(commands
            .iter()
            .any(|c| c.starts_with("INFRA_STATUS_STG=") && c.contains("|| echo 'on'")));

        let synth = commands.iter().find(|c| c.contains(" synth ")).unwrap();
        assert!(synth.contains("--infra-status-dev $INFRA_STATUS_DEV"));
        assert!(synth.contains("--infra-status-prd $INFRA_STATUS_PRD"));
        assert!(!commands.iter().any(|c| c.starts_with("aws s3 sync")));
    }

    #[test]
    fn test_assembly_upload_when_bucket_set() {
        let mut settings = Settings::default();
        settings.pipeline.assembly_bucket = Some("learn-assemblies".to_string());
        let commands = synth_commands(&settings);
        assert!(commands
            .last()
            .unwrap()
            .starts_with("aws s3 sync cdk.out s3://learn-assemblies/learn-code-pipeline/"));
    }

    #[test]
    fn test_role_statements() {
        let statements = synth_role_statements();
        assert_eq!(statements.len(), 4);
        assert!(statements[0].allows("ssm:GetParameter*"));
        assert_eq!(statements[0].resources.len(), 4);
        assert!(statements[1].allows("sts:AssumeRole"));
        assert!(statements[2].allows("iam:ListAttachedRolePolicies"));
        assert!(statements[3].allows("ssm:GetParameters"));
    }
}
