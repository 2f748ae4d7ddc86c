// `learn-infra check-trigger`
//
// Run by the pipeline to decide whether the current run came from the
// trigger function: prints `lambda` or `github` on stdout.

use anyhow::Result;
use clap::Args;
use learn_infra_core::pipeline::{classify, DEFAULT_WINDOW_SECS};
use learn_infra_core::TriggerSource;
use tracing::debug;

#[derive(Args, Debug, Clone)]
pub struct CheckTriggerArgs {
    /// Unix timestamp (seconds, may be fractional) recorded by the trigger function
    #[arg(long, value_name = "SECONDS")]
    pub lambda_trigger_timestamp: f64,

    /// How old the timestamp may be and still count as a lambda run
    #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_WINDOW_SECS)]
    pub diff_seconds: f64,
}

pub fn run(args: &CheckTriggerArgs) -> Result<()> {
    let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    println!("{}", decide(args, now));
    Ok(())
}

pub fn decide(args: &CheckTriggerArgs, now: f64) -> TriggerSource {
    let source = classify(now, args.lambda_trigger_timestamp, args.diff_seconds);
    debug!(
        now,
        timestamp = args.lambda_trigger_timestamp,
        window = args.diff_seconds,
        source = %source,
        "Classified trigger"
    );
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(ts: f64) -> CheckTriggerArgs {
        CheckTriggerArgs {
            lambda_trigger_timestamp: ts,
            diff_seconds: DEFAULT_WINDOW_SECS,
        }
    }

    #[test]
    fn test_decide() {
        assert_eq!(decide(&args(1000.0), 1060.0), TriggerSource::Lambda);
        assert_eq!(decide(&args(1000.0), 1200.0), TriggerSource::Github);
        assert_eq!(decide(&args(1000.0), 999.0), TriggerSource::Github);
    }
}
