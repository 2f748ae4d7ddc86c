use crate::{LogFormat, Settings};
use anyhow::{Context, Result};

pub const ENV_PREFIX: &str = "LEARN_INFRA_";

/// Abstraction over environment-variable lookups so tests can supply a map
/// instead of mutating the process environment.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the LEARN_INFRA_ prefix.
    /// Used for the `.env` bundle names (ACCOUNT, REGION, REPO_STRING, ...).
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the settings.
///
/// Prefixed variables win over the unprefixed `.env` bundle names.
pub fn apply_env_overrides<E: EnvSource>(settings: &mut Settings, env: &E) -> Result<()> {
    if let Some(account) = get_string(env, "ACCOUNT", "ACCOUNT") {
        settings.aws.account = account;
    }
    if let Some(region) = get_string(env, "REGION", "REGION") {
        settings.aws.region = region;
    }

    if let Some(repo) = get_string(env, "REPO_STRING", "REPO_STRING") {
        settings.source.repository = repo;
    }
    if let Some(branch) = get_string(env, "REPO_BRANCH", "REPO_BRANCH") {
        settings.source.branch = branch;
    }
    if let Some(arn) = get_string(env, "CODE_CONNECTION_ARN", "CODE_CONNECTION_ARN") {
        settings.source.connection_arn = arn;
    }

    if let Some(name) = env.get("PIPELINE_NAME").filter(|v| !v.is_empty()) {
        settings.pipeline.name = name;
    }
    if let Some(url) = env.get("REVIEW_URL").filter(|v| !v.is_empty()) {
        settings.pipeline.review_url = url;
    }
    if let Some(bucket) = env.get("ASSEMBLY_BUCKET") {
        settings.pipeline.assembly_bucket = if bucket.is_empty() {
            None
        } else {
            Some(bucket)
        };
    }

    if let Some(bucket) = env.get("ASSET_BUCKET").filter(|v| !v.is_empty()) {
        settings.assets.bucket = bucket;
    }
    if let Some(prefix) = env.get("ASSET_PREFIX") {
        // Normalize prefix: ensure it ends with "/" if non-empty
        settings.assets.prefix = if prefix.is_empty() || prefix.ends_with('/') {
            prefix
        } else {
            format!("{}/", prefix)
        };
    }

    if let Some(level) = env.get("LOG_LEVEL").filter(|v| !v.is_empty()) {
        settings.logging.level = level;
    }
    if let Some(format) = env.get("LOG_FORMAT") {
        settings.logging.format = format
            .parse::<LogFormat>()
            .context("Invalid LEARN_INFRA_LOG_FORMAT value")?;
    }

    Ok(())
}

fn get_string<E: EnvSource>(env: &E, key: &str, raw_key: &str) -> Option<String> {
    env.get(key)
        .or_else(|| env.get_raw(raw_key))
        .filter(|value| !value.is_empty())
}
