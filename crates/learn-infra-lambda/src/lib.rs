// learn-infra-lambda - Lambda functions deployed by the learn stacks
//
// pipeline-trigger: writes an environment's infra status flag, then starts
//                   the delivery pipeline with TRIGGER=lambda
// backend:          proxies a random joke from the public joke API
//
// Philosophy: Use lambda_runtime's provided tokio
// Handlers take their AWS/HTTP dependencies as trait objects so they can be
// exercised without the network.

use lambda_runtime::{service_fn, Error, LambdaEvent};
use std::sync::Arc;

mod backend;
mod response;
mod trigger;

pub use backend::{handle_backend, BackendError, HttpJokeSource, JokeSource, DEFAULT_JOKE_API_URL};
pub use response::TriggerResponse;
pub use trigger::{
    handle_trigger, CodePipelineStarter, ParameterStore, PipelineStarter, SsmParameterStore,
    TriggerConfig, TriggerError, TriggerEvent, PARAMETER_DESCRIPTION,
};

/// JSON logs without timestamps; CloudWatch stamps every line already
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Ignore error if a subscriber is already installed (idempotent)
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(false)
        .without_time()
        .try_init();
}

/// Pipeline trigger runtime entry point
pub async fn run_trigger() -> Result<(), Error> {
    let config = Arc::new(TriggerConfig::from_env()?);
    tracing::info!(
        pipeline = %config.pipeline_name,
        parameter = %config.parameter_name,
        env = %config.env,
        "Pipeline trigger starting"
    );

    let sdk_config = aws_config::load_from_env().await;
    let store = Arc::new(SsmParameterStore::new(aws_sdk_ssm::Client::new(&sdk_config)));
    let starter = Arc::new(CodePipelineStarter::new(aws_sdk_codepipeline::Client::new(
        &sdk_config,
    )));

    lambda_runtime::run(service_fn(move |event: LambdaEvent<TriggerEvent>| {
        let config = config.clone();
        let store = store.clone();
        let starter = starter.clone();
        async move {
            let (payload, _context) = event.into_parts();
            handle_trigger(&payload, &config, store.as_ref(), starter.as_ref())
                .await
                .map_err(Error::from)
        }
    }))
    .await
}

/// Backend proxy runtime entry point
pub async fn run_backend() -> Result<(), Error> {
    let source = Arc::new(HttpJokeSource::from_env()?);
    tracing::info!(url = %source.url(), "Backend proxy starting");

    lambda_runtime::run(service_fn(move |_event: LambdaEvent<serde_json::Value>| {
        let source = source.clone();
        async move { Ok::<_, Error>(handle_backend(source.as_ref()).await) }
    }))
    .await
}
