// Deployment environments and the per-environment lookup table
//
// Every environment-keyed value (network block, domain, SSM paths) hangs off
// the closed `DeployEnv` enum so a missing entry is a compile error rather
// than a runtime lookup miss.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Project name used in resource names and parameter paths
pub const PROJECT: &str = "learn";

/// SSM parameter holding the `.env` bundle fetched by the synth step
pub const ENV_SSM_PARAMETER: &str = "/cdk/learn/env";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployEnv {
    Dev,
    Stg,
    Prd,
}

impl DeployEnv {
    /// All environments in deployment order
    pub const ALL: [DeployEnv; 3] = [DeployEnv::Dev, DeployEnv::Stg, DeployEnv::Prd];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeployEnv::Dev => "dev",
            DeployEnv::Stg => "stg",
            DeployEnv::Prd => "prd",
        }
    }

    /// Static network/domain settings for this environment
    pub fn config(&self) -> &'static EnvConfig {
        match self {
            DeployEnv::Dev => &DEV_CONFIG,
            DeployEnv::Stg => &STG_CONFIG,
            DeployEnv::Prd => &PRD_CONFIG,
        }
    }

    /// SSM parameter path of this environment's infra status flag
    pub fn infra_status_parameter(&self) -> &'static str {
        match self {
            DeployEnv::Dev => "/cdk/learn/infraStatusDev",
            DeployEnv::Stg => "/cdk/learn/infraStatusStg",
            DeployEnv::Prd => "/cdk/learn/infraStatusPrd",
        }
    }

    /// Shell variable name the synth step uses for this environment's flag
    pub fn infra_status_variable(&self) -> &'static str {
        match self {
            DeployEnv::Dev => "INFRA_STATUS_DEV",
            DeployEnv::Stg => "INFRA_STATUS_STG",
            DeployEnv::Prd => "INFRA_STATUS_PRD",
        }
    }

    /// Whether the on-demand trigger function is deployed for this environment.
    /// Production is only reachable through a source push.
    pub fn has_trigger(&self) -> bool {
        !matches!(self, DeployEnv::Prd)
    }

    /// Title-cased name used when deriving logical ids and stage names
    pub fn title(&self) -> &'static str {
        match self {
            DeployEnv::Dev => "Dev",
            DeployEnv::Stg => "Stg",
            DeployEnv::Prd => "Prd",
        }
    }
}

impl fmt::Display for DeployEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployEnv {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(DeployEnv::Dev),
            "stg" | "staging" => Ok(DeployEnv::Stg),
            "prd" | "prod" | "production" => Ok(DeployEnv::Prd),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

/// Immutable per-environment settings, defined once at build time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub cidr_block: &'static str,
    pub domain_name: &'static str,
}

static DEV_CONFIG: EnvConfig = EnvConfig {
    cidr_block: "10.0.0.0/16",
    domain_name: "dev-api.learn.com",
};

static STG_CONFIG: EnvConfig = EnvConfig {
    cidr_block: "10.1.0.0/16",
    domain_name: "stg-api.learn.com",
};

static PRD_CONFIG: EnvConfig = EnvConfig {
    cidr_block: "10.2.0.0/16",
    domain_name: "api.learn.com",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_env_from_str() {
        assert_eq!("dev".parse::<DeployEnv>().unwrap(), DeployEnv::Dev);
        assert_eq!("staging".parse::<DeployEnv>().unwrap(), DeployEnv::Stg);
        assert_eq!("PROD".parse::<DeployEnv>().unwrap(), DeployEnv::Prd);
        assert!("qa".parse::<DeployEnv>().is_err());
    }

    #[test]
    fn test_env_configs_do_not_overlap() {
        let blocks: Vec<_> = DeployEnv::ALL
            .iter()
            .map(|env| env.config().cidr_block)
            .collect();
        assert_eq!(blocks, vec!["10.0.0.0/16", "10.1.0.0/16", "10.2.0.0/16"]);
    }

    #[test]
    fn test_parameter_paths_are_project_scoped() {
        for env in DeployEnv::ALL {
            assert!(env.infra_status_parameter().starts_with("/cdk/learn/"));
        }
        assert!(ENV_SSM_PARAMETER.starts_with(&format!("/cdk/{}/", PROJECT)));
    }

    #[test]
    fn test_production_has_no_trigger() {
        assert!(DeployEnv::Dev.has_trigger());
        assert!(DeployEnv::Stg.has_trigger());
        assert!(!DeployEnv::Prd.has_trigger());
    }
}
