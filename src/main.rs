use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use learn_infra::commands::{check_trigger, plan, synth};
use learn_infra_config::{LogFormat, LoggingConfig, Settings};
use std::path::PathBuf;

/// Synthesize and plan the learn service infrastructure
#[derive(Parser)]
#[command(name = "learn-infra")]
#[command(version)]
#[command(about = "Synthesize CloudFormation for the learn service and its delivery pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log format: text or json
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write every stack template and the manifest to an assembly directory
    Synth(synth::SynthArgs),
    /// Show stage order, approvals, and which stages a run would skip
    Plan(plan::PlanArgs),
    /// Print `lambda` or `github` depending on the trigger timestamp
    CheckTrigger(check_trigger::CheckTriggerArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Synth(args) => {
            let settings = load_settings(&cli)?;
            synth::run(args, &settings)
        }
        Commands::Plan(args) => {
            let settings = load_settings(&cli)?;
            plan::run(args, &settings)
        }
        Commands::CheckTrigger(args) => {
            // Runs inside the pipeline before any config exists
            learn_infra::init_tracing(&logging_overrides(&cli, LoggingConfig::default()));
            check_trigger::run(args)
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Settings::load().context("Failed to load configuration")?,
    };

    // CLI flags win over file and environment
    settings.logging = logging_overrides(cli, settings.logging);
    learn_infra::init_tracing(&settings.logging);
    Ok(settings)
}

fn logging_overrides(cli: &Cli, mut logging: LoggingConfig) -> LoggingConfig {
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    logging
}
