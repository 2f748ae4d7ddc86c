// CLI integration tests: run the built binary against a temporary directory

use anyhow::Result;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn learn_infra(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_learn-infra"))
        .args(args)
        .current_dir(dir)
        // Keep ambient AWS/.env variables from leaking into the run
        .env_clear()
        .env("RUST_LOG", "error")
        .output()
        .expect("Failed to run binary")
}

#[test]
fn test_cli_help() -> Result<()> {
    let dir = TempDir::new()?;
    let output = learn_infra(dir.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("synth"));
    assert!(stdout.contains("plan"));
    assert!(stdout.contains("check-trigger"));
    assert!(stdout.contains("--log-level"));
    assert!(stdout.contains("--config"));
    Ok(())
}

#[test]
fn test_synth_writes_assembly() -> Result<()> {
    let dir = TempDir::new()?;
    let output = learn_infra(
        dir.path(),
        &["synth", "--out", "cdk.out", "--infra-status-dev", "off"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let out = dir.path().join("cdk.out");
    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("manifest.json"))?)?;
    assert_eq!(manifest["infra_status"]["dev"], "off");
    assert_eq!(manifest["infra_status"]["stg"], "on");
    assert!(out.join("code-pipeline.template.json").exists());
    assert!(out.join("DevStage-StatelessStack.template.json").exists());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().any(|l| l == "DevStage-NetworkStack"));
    Ok(())
}

#[test]
fn test_synth_rejects_invalid_status() -> Result<()> {
    let dir = TempDir::new()?;
    let output = learn_infra(
        dir.path(),
        &["synth", "--out", "cdk.out", "--infra-status-stg", "paused"],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("paused"));
    assert!(!dir.path().join("cdk.out").exists());
    Ok(())
}

#[test]
fn test_synth_uses_config_file() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(
        dir.path().join("learn-infra.toml"),
        "[aws]\naccount = \"123456789012\"\nregion = \"ap-northeast-1\"\n",
    )?;

    let output = learn_infra(dir.path(), &["synth", "--out", "out"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let manifest: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
        dir.path().join("out").join("manifest.json"),
    )?)?;
    assert_eq!(
        manifest["stacks"][0]["environment"],
        "aws://123456789012/ap-northeast-1"
    );
    Ok(())
}

#[test]
fn test_plan_skips_production_for_lambda() -> Result<()> {
    let dir = TempDir::new()?;
    let output = learn_infra(dir.path(), &["plan", "--trigger", "lambda"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let prd = stdout.lines().find(|l| l.contains("PrdStage")).unwrap();
    assert!(prd.contains("skip"));
    Ok(())
}

#[test]
fn test_check_trigger() -> Result<()> {
    let dir = TempDir::new()?;
    let now = unix_now();

    let recent = learn_infra(
        dir.path(),
        &["check-trigger", "--lambda-trigger-timestamp", &format!("{}", now - 5.0)],
    );
    assert!(recent.status.success());
    assert_eq!(String::from_utf8_lossy(&recent.stdout).trim(), "lambda");

    let stale = learn_infra(
        dir.path(),
        &[
            "check-trigger",
            "--lambda-trigger-timestamp",
            &format!("{}", now - 600.0),
            "--diff-seconds",
            "120",
        ],
    );
    assert!(stale.status.success());
    assert_eq!(String::from_utf8_lossy(&stale.stdout).trim(), "github");
    Ok(())
}

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
