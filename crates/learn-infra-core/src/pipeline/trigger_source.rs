// Classify what started a pipeline run from the trigger function's timestamp

use std::fmt;
use std::str::FromStr;

/// Seconds a trigger-function timestamp stays fresh
pub const DEFAULT_WINDOW_SECS: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Lambda,
    Github,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Lambda => "lambda",
            TriggerSource::Github => "github",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lambda" => Ok(TriggerSource::Lambda),
            "github" => Ok(TriggerSource::Github),
            other => Err(format!("unknown trigger source '{}'", other)),
        }
    }
}

/// A run is lambda-triggered when the stamp is not in the future and at most
/// `window_secs` old
pub fn classify(now: f64, timestamp: f64, window_secs: f64) -> TriggerSource {
    let age = now - timestamp;
    if (0.0..=window_secs).contains(&age) {
        TriggerSource::Lambda
    } else {
        TriggerSource::Github
    }
}
