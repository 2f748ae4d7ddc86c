// Infra status flag ("on"/"off")
//
// The flag is persisted in SSM, read by the synth step, and rewritten by the
// trigger function. Parsing is strict: anything but the two literals is a
// configuration error and must stop synthesis before output is produced.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfraStatus {
    /// Default when the parameter is absent
    #[default]
    On,
    Off,
}

impl InfraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfraStatus::On => "on",
            InfraStatus::Off => "off",
        }
    }

    /// Service desired count for this status
    pub fn desired_count(&self) -> u32 {
        match self {
            InfraStatus::On => 1,
            InfraStatus::Off => 0,
        }
    }

    /// Parse an optional raw value, defaulting to `On` when absent
    pub fn from_optional(raw: Option<&str>) -> Result<Self, ConfigError> {
        match raw {
            Some(value) => value.parse(),
            None => Ok(InfraStatus::default()),
        }
    }
}

impl fmt::Display for InfraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InfraStatus {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(InfraStatus::On),
            "off" => Ok(InfraStatus::Off),
            other => Err(ConfigError::InvalidInfraStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desired_count() {
        assert_eq!(InfraStatus::On.desired_count(), 1);
        assert_eq!(InfraStatus::Off.desired_count(), 0);
    }

    #[test]
    fn test_parse_is_strict() {
        assert_eq!("on".parse::<InfraStatus>().unwrap(), InfraStatus::On);
        assert_eq!("off".parse::<InfraStatus>().unwrap(), InfraStatus::Off);

        for bad in ["ON", "Off", "", " on", "yes", "1"] {
            let err = bad.parse::<InfraStatus>().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidInfraStatus(ref v) if v == bad));
        }
    }

    #[test]
    fn test_absent_defaults_to_on() {
        assert_eq!(InfraStatus::from_optional(None).unwrap(), InfraStatus::On);
        assert_eq!(
            InfraStatus::from_optional(Some("off")).unwrap(),
            InfraStatus::Off
        );
        assert!(InfraStatus::from_optional(Some("maybe")).is_err());
    }
}
