// learn-infra-config - Environment table, infra status flag, and settings
//
// Settings are layered from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from LEARN_INFRA_CONFIG env var (or --config)
// 3. Config file contents from LEARN_INFRA_CONFIG_CONTENT env var
// 4. Default config file location (./learn-infra.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod env;
mod env_overrides;
mod error;
mod sources;
mod status;
mod validation;

pub use env::{DeployEnv, EnvConfig, ENV_SSM_PARAMETER, PROJECT};
pub use env_overrides::{EnvSource, ENV_PREFIX};
pub use error::ConfigError;
pub use sources::StdEnvSource;
pub use status::InfraStatus;

/// Top-level settings shared by the synthesizer and the CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub aws: AwsSettings,

    #[serde(default)]
    pub source: SourceSettings,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub assets: AssetSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Target account and region for every stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsSettings {
    /// Empty means environment-agnostic templates
    #[serde(default)]
    pub account: String,
    pub region: String,
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self {
            account: String::new(),
            region: "us-east-1".to_string(),
        }
    }
}

/// Source repository watched by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// `owner/name` form
    #[serde(default)]
    pub repository: String,
    pub branch: String,
    #[serde(default)]
    pub connection_arn: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            repository: String::new(),
            branch: "main".to_string(),
            connection_arn: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub name: String,
    /// Link shown on manual approval steps
    pub review_url: String,
    /// When set, the synth step also uploads the assembly to this bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assembly_bucket: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            name: "learn-code-pipeline".to_string(),
            review_url: "https://infra.shirokumapower.jp/infra-diff?system=learn".to_string(),
            assembly_bucket: None,
        }
    }
}

/// Where the Lambda deployment zips live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSettings {
    pub bucket: String,
    pub prefix: String,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            bucket: "learn-infra-assets".to_string(),
            prefix: "lambda/".to_string(),
        }
    }
}

impl AssetSettings {
    /// Object key of a Lambda zip within the asset bucket
    pub fn key_for(&self, artifact: &str) -> String {
        format!("{}{}.zip", self.prefix, artifact)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::UnknownLogFormat(s.to_string())),
        }
    }
}

impl Settings {
    /// Load settings from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_settings(&StdEnvSource, None)
    }

    /// Load settings starting from an explicit file (for CLI --config flag)
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_settings(&StdEnvSource, Some(path.as_ref()))
    }

    /// Load settings using a caller-supplied environment (useful for testing)
    pub fn load_with_env<E: EnvSource>(env: &E, path: Option<&Path>) -> Result<Self> {
        sources::load_settings(env, path)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        validation::validate_settings(self)
    }

    /// Whether templates are pinned to a concrete account
    pub fn is_env_agnostic(&self) -> bool {
        self.aws.account.is_empty()
    }
}
