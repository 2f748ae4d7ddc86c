// `learn-infra synth`

use anyhow::{Context, Result};
use clap::Args;
use learn_infra_config::Settings;
use learn_infra_core::{build_app, InfraStatuses, Manifest};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct SynthArgs {
    /// Cloud assembly output directory
    #[arg(short, long, value_name = "DIR", default_value = "cdk.out")]
    pub out: PathBuf,

    /// Infra status for dev: on or off (default on)
    #[arg(long, value_name = "STATUS", env = "INFRA_STATUS_DEV")]
    pub infra_status_dev: Option<String>,

    /// Infra status for stg: on or off (default on)
    #[arg(long, value_name = "STATUS", env = "INFRA_STATUS_STG")]
    pub infra_status_stg: Option<String>,

    /// Infra status for prd: on or off (default on)
    #[arg(long, value_name = "STATUS", env = "INFRA_STATUS_PRD")]
    pub infra_status_prd: Option<String>,
}

pub fn run(args: &SynthArgs, settings: &Settings) -> Result<()> {
    let manifest = synthesize(args, settings, &args.out)?;
    for entry in &manifest.stacks {
        println!("{}", entry.name);
    }
    Ok(())
}

/// Parse the flags, build the app, and write it to `out`. Nothing is written
/// when a flag is invalid.
pub fn synthesize(args: &SynthArgs, settings: &Settings, out: &Path) -> Result<Manifest> {
    let statuses = InfraStatuses::parse(
        args.infra_status_dev.as_deref(),
        args.infra_status_stg.as_deref(),
        args.infra_status_prd.as_deref(),
    )
    .context("Invalid infra status flag")?;

    info!(
        dev = %statuses.dev,
        stg = %statuses.stg,
        prd = %statuses.prd,
        "Synthesizing learn infrastructure"
    );

    let assembly = build_app(settings, statuses).context("Failed to synthesize stacks")?;
    let manifest = assembly
        .write_to(out)
        .with_context(|| format!("Failed to write cloud assembly to {}", out.display()))?;

    info!(
        stacks = manifest.stacks.len(),
        out = %out.display(),
        "Synthesis complete"
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(dev: Option<&str>) -> SynthArgs {
        SynthArgs {
            out: PathBuf::from("unused"),
            infra_status_dev: dev.map(str::to_string),
            infra_status_stg: None,
            infra_status_prd: None,
        }
    }

    #[test]
    fn test_synthesize_writes_manifest() {
        let dir = TempDir::new().unwrap();
        let manifest = synthesize(&args(Some("off")), &Settings::default(), dir.path()).unwrap();
        assert_eq!(manifest.infra_status["dev"], "off");
        assert!(dir.path().join("manifest.json").exists());
    }

    #[test]
    fn test_invalid_status_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("cdk.out");
        let err = synthesize(&args(Some("maybe")), &Settings::default(), &out).unwrap_err();
        assert!(format!("{:#}", err).contains("maybe"));
        assert!(!out.exists());
    }
}
