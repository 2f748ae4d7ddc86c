//! Error types for synthesis and for the pipeline/deployment state models

use learn_infra_config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or writing the cloud assembly
#[derive(Debug, Error)]
pub enum SynthError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid CIDR block '{0}'")]
    InvalidCidr(String),

    #[error("Subnet /{mask} #{index} does not fit in {cidr}")]
    SubnetOutOfRange { cidr: String, mask: u8, index: u32 },

    #[error("Duplicate logical id '{id}' in stack template")]
    DuplicateLogicalId { id: String },

    #[error("Resource '{resource}' references unknown resource '{target}'")]
    UnknownReference { resource: String, target: String },

    #[error("Stack '{stack}' depends on unknown stack '{dependency}'")]
    MissingDependency { stack: String, dependency: String },

    #[error("Duplicate stack name '{0}'")]
    DuplicateStack(String),

    #[error("Dependency cycle between stacks: {0}")]
    DependencyCycle(String),

    #[error("Stack '{stack}': {source}")]
    InvalidTemplate {
        stack: String,
        #[source]
        source: Box<SynthError>,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize template: {0}")]
    Json(#[from] serde_json::Error),
}

/// Illegal transitions in a pipeline execution
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("Unknown pipeline stage '{0}'")]
    UnknownStage(String),

    #[error("Stage '{stage}' cannot start: predecessor '{predecessor}' is {status}")]
    PredecessorIncomplete {
        stage: String,
        predecessor: String,
        status: String,
    },

    #[error("Stage '{stage}' cannot {action} while {status}")]
    InvalidTransition {
        stage: String,
        action: &'static str,
        status: String,
    },

    #[error("Stage '{stage}' has no approval step named '{step}'")]
    UnknownApproval { stage: String, step: String },
}

/// Illegal transitions in a blue/green deployment
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeploymentError {
    #[error("Cannot {action} a deployment that is {state}")]
    InvalidTransition { action: &'static str, state: String },
}

pub type Result<T> = std::result::Result<T, SynthError>;
