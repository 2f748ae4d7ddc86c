//! Error types for environment and flag parsing

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The infra status flag held something other than "on" or "off"
    #[error("Invalid infra status '{0}'. Must be 'on' or 'off'.")]
    InvalidInfraStatus(String),

    /// Unknown deployment environment name
    #[error("Unknown deployment environment '{0}'. Supported: dev, stg, prd")]
    UnknownEnvironment(String),

    /// Unsupported log format name
    #[error("Unsupported log format '{0}'. Supported: text, json")]
    UnknownLogFormat(String),
}
