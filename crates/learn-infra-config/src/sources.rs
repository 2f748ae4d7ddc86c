// Settings source loading.
//
// Priority order:
// 1. Environment variables (LEARN_INFRA_* prefix, then the raw `.env` names)
// 2. Explicit config file (--config) or path from LEARN_INFRA_CONFIG
// 3. Inline config content from LEARN_INFRA_CONFIG_CONTENT
// 4. Default config file (./learn-infra.toml)
// 5. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::Settings;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_FILE: &str = "./learn-infra.toml";

/// Load settings from file (if any), then apply environment overrides and validate.
pub fn load_settings<E: EnvSource>(env: &E, explicit: Option<&Path>) -> Result<Settings> {
    let mut settings = match explicit {
        Some(path) => read_file(path)?,
        None => load_from_file(env)?.unwrap_or_default(),
    };

    env_overrides::apply_env_overrides(&mut settings, env)?;
    settings.validate()?;
    Ok(settings)
}

fn load_from_file<E: EnvSource>(env: &E) -> Result<Option<Settings>> {
    if let Some(path) = env.get("CONFIG") {
        return read_file(Path::new(&path)).map(Some);
    }

    if let Some(content) = env.get("CONFIG_CONTENT") {
        let settings: Settings = toml::from_str(&content)
            .context("Failed to parse inline config from LEARN_INFRA_CONFIG_CONTENT")?;
        return Ok(Some(settings));
    }

    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        return read_file(default_path).map(Some);
    }

    Ok(None)
}

fn read_file(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Process environment
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}
