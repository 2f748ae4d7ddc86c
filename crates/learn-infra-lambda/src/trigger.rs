// Pipeline trigger handler
//
// Validates the requested status, persists it to the environment's SSM
// parameter, then starts the pipeline with TRIGGER=lambda. The pipeline is
// only started after the write succeeds. Failures surface as invocation
// errors; there is no retry.

use async_trait::async_trait;
use learn_infra_config::{ConfigError, DeployEnv, InfraStatus};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::response::TriggerResponse;

pub const PARAMETER_DESCRIPTION: &str = "learn infra status (set by Lambda)";
const TRIGGER_VARIABLE: &str = "TRIGGER";
const TRIGGER_VALUE: &str = "lambda";

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error(transparent)]
    InvalidInput(#[from] ConfigError),

    #[error("Requested environment '{requested}' but this function is bound to '{bound}'")]
    EnvMismatch { requested: DeployEnv, bound: DeployEnv },

    #[error("Missing required environment variable {0}")]
    MissingVariable(&'static str),

    #[error("Failed to write parameter {name}: {message}")]
    ParameterWrite { name: String, message: String },

    #[error("Failed to start pipeline {name}: {message}")]
    PipelineStart { name: String, message: String },
}

/// Invocation payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TriggerEvent {
    pub status: String,
    #[serde(default)]
    pub env: Option<String>,
}

/// Values bound to the function at deploy time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    pub pipeline_name: String,
    pub parameter_name: String,
    pub env: DeployEnv,
}

impl TriggerConfig {
    pub fn from_env() -> Result<Self, TriggerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, TriggerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(TriggerError::MissingVariable(key))
        };

        Ok(Self {
            pipeline_name: required("PIPELINE_NAME")?,
            parameter_name: required("SSM_PARAMETER_NAME")?,
            env: required("DEPLOY_ENV")?.parse()?,
        })
    }
}

#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Write `value` to `name` as a String parameter, overwriting any previous value
    async fn put_parameter(
        &self,
        name: &str,
        value: &str,
        description: &str,
    ) -> Result<(), TriggerError>;
}

#[async_trait]
pub trait PipelineStarter: Send + Sync {
    /// Start an execution and return its id
    async fn start_execution(
        &self,
        pipeline: &str,
        variables: &[(&str, &str)],
    ) -> Result<String, TriggerError>;
}

pub async fn handle_trigger<P, S>(
    event: &TriggerEvent,
    config: &TriggerConfig,
    store: &P,
    starter: &S,
) -> Result<TriggerResponse, TriggerError>
where
    P: ParameterStore + ?Sized,
    S: PipelineStarter + ?Sized,
{
    let status: InfraStatus = match event.status.parse() {
        Ok(status) => status,
        Err(err) => {
            warn!(status = %event.status, "Rejected invalid infra status");
            return Err(err.into());
        }
    };

    if let Some(requested) = event.env.as_deref() {
        let requested: DeployEnv = requested.parse()?;
        if requested != config.env {
            return Err(TriggerError::EnvMismatch {
                requested,
                bound: config.env,
            });
        }
    }

    store
        .put_parameter(&config.parameter_name, status.as_str(), PARAMETER_DESCRIPTION)
        .await?;
    info!(parameter = %config.parameter_name, status = %status, "Updated infra status");

    let execution_id = starter
        .start_execution(&config.pipeline_name, &[(TRIGGER_VARIABLE, TRIGGER_VALUE)])
        .await?;
    info!(
        pipeline = %config.pipeline_name,
        execution_id = %execution_id,
        "Pipeline started"
    );

    Ok(TriggerResponse::processed())
}

/// SSM-backed parameter store
#[derive(Clone)]
pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
}

impl SsmParameterStore {
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn put_parameter(
        &self,
        name: &str,
        value: &str,
        description: &str,
    ) -> Result<(), TriggerError> {
        self.client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(aws_sdk_ssm::types::ParameterType::String)
            .overwrite(true)
            .description(description)
            .send()
            .await
            .map_err(|e| TriggerError::ParameterWrite {
                name: name.to_string(),
                message: aws_sdk_ssm::error::DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }
}

/// CodePipeline-backed starter
#[derive(Clone)]
pub struct CodePipelineStarter {
    client: aws_sdk_codepipeline::Client,
}

impl CodePipelineStarter {
    pub fn new(client: aws_sdk_codepipeline::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PipelineStarter for CodePipelineStarter {
    async fn start_execution(
        &self,
        pipeline: &str,
        variables: &[(&str, &str)],
    ) -> Result<String, TriggerError> {
        let start_error = |message: String| TriggerError::PipelineStart {
            name: pipeline.to_string(),
            message,
        };

        let mut request = self.client.start_pipeline_execution().name(pipeline);
        for (name, value) in variables {
            let variable = aws_sdk_codepipeline::types::PipelineVariable::builder()
                .name(*name)
                .value(*value)
                .build()
                .map_err(|e| start_error(e.to_string()))?;
            request = request.variables(variable);
        }

        let output = request
            .send()
            .await
            .map_err(|e| start_error(aws_sdk_codepipeline::error::DisplayErrorContext(&e).to_string()))?;

        Ok(output.pipeline_execution_id().unwrap_or_default().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        writes: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ParameterStore for FakeStore {
        async fn put_parameter(
            &self,
            name: &str,
            value: &str,
            description: &str,
        ) -> Result<(), TriggerError> {
            if self.fail {
                return Err(TriggerError::ParameterWrite {
                    name: name.to_string(),
                    message: "AccessDenied".to_string(),
                });
            }
            self.writes.lock().unwrap().push((
                name.to_string(),
                value.to_string(),
                description.to_string(),
            ));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStarter {
        starts: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    #[async_trait]
    impl PipelineStarter for FakeStarter {
        async fn start_execution(
            &self,
            pipeline: &str,
            variables: &[(&str, &str)],
        ) -> Result<String, TriggerError> {
            let variables = variables
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.starts
                .lock()
                .unwrap()
                .push((pipeline.to_string(), variables));
            Ok("exec-1234".to_string())
        }
    }

    fn config() -> TriggerConfig {
        TriggerConfig {
            pipeline_name: "learn-code-pipeline".to_string(),
            parameter_name: "/cdk/learn/infraStatusDev".to_string(),
            env: DeployEnv::Dev,
        }
    }

    fn event(status: &str, env: Option<&str>) -> TriggerEvent {
        TriggerEvent {
            status: status.to_string(),
            env: env.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_writes_then_starts_pipeline() {
        let store = FakeStore::default();
        let starter = FakeStarter::default();

        let response = handle_trigger(&event("off", None), &config(), &store, &starter)
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({ "statusCode": 200, "body": "\"Processed\"" })
        );

        let writes = store.writes.lock().unwrap();
        assert_eq!(
            writes.as_slice(),
            [(
                "/cdk/learn/infraStatusDev".to_string(),
                "off".to_string(),
                PARAMETER_DESCRIPTION.to_string()
            )]
        );
        let starts = starter.starts.lock().unwrap();
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].0, "learn-code-pipeline");
        assert_eq!(starts[0].1, [("TRIGGER".to_string(), "lambda".to_string())]);
    }

    #[tokio::test]
    async fn test_invalid_status_writes_nothing() {
        let store = FakeStore::default();
        let starter = FakeStarter::default();

        for bad in ["maybe", "ON", ""] {
            let err = handle_trigger(&event(bad, None), &config(), &store, &starter)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                TriggerError::InvalidInput(ConfigError::InvalidInfraStatus(_))
            ));
        }
        assert!(store.writes.lock().unwrap().is_empty());
        assert!(starter.starts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_does_not_start_pipeline() {
        let store = FakeStore {
            fail: true,
            ..FakeStore::default()
        };
        let starter = FakeStarter::default();

        let err = handle_trigger(&event("on", None), &config(), &store, &starter)
            .await
            .unwrap_err();
        assert!(matches!(err, TriggerError::ParameterWrite { .. }));
        assert!(starter.starts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_env_must_match_binding() {
        let store = FakeStore::default();
        let starter = FakeStarter::default();

        let err = handle_trigger(&event("on", Some("stg")), &config(), &store, &starter)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TriggerError::EnvMismatch {
                requested: DeployEnv::Stg,
                bound: DeployEnv::Dev
            }
        ));
        assert!(store.writes.lock().unwrap().is_empty());

        handle_trigger(&event("on", Some("dev")), &config(), &store, &starter)
            .await
            .unwrap();
        assert_eq!(store.writes.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_event_deserializes_without_env() {
        let event: TriggerEvent = serde_json::from_str(r#"{"status":"on"}"#).unwrap();
        assert_eq!(event.status, "on");
        assert!(event.env.is_none());
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PIPELINE_NAME", "learn-code-pipeline"),
            ("SSM_PARAMETER_NAME", "/cdk/learn/infraStatusStg"),
            ("DEPLOY_ENV", "stg"),
        ]);
        let config = TriggerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.env, DeployEnv::Stg);

        let err = TriggerConfig::from_lookup(|k| {
            (k != "SSM_PARAMETER_NAME").then(|| vars.get(k).map(|v| v.to_string())).flatten()
        })
        .unwrap_err();
        assert!(matches!(err, TriggerError::MissingVariable("SSM_PARAMETER_NAME")));
    }
}
