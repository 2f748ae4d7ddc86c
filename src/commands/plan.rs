// `learn-infra plan`

use anyhow::Result;
use clap::Args;
use learn_infra_config::Settings;
use learn_infra_core::pipeline::{trigger_variables, GuardOutcome, PipelineDefinition};
use learn_infra_core::TriggerSource;
use std::fmt::Write;

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// What started the run: github or lambda
    #[arg(long, value_name = "SOURCE", default_value = "github")]
    pub trigger: TriggerSource,
}

pub fn run(args: &PlanArgs, settings: &Settings) -> Result<()> {
    let definition = PipelineDefinition::standard(settings);
    print!("{}", render_plan(&definition, args.trigger));
    Ok(())
}

pub fn render_plan(definition: &PipelineDefinition, trigger: TriggerSource) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Pipeline {} (TRIGGER={})", definition.name, trigger);

    let width = definition
        .stages
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0);

    for (i, stage) in definition.plan(&trigger_variables(trigger)).iter().enumerate() {
        let outcome = match stage.outcome {
            GuardOutcome::Enter => "run",
            GuardOutcome::Skip => "skip",
        };
        let _ = write!(out, "  {}. {:<width$}  {:<4}", i + 1, stage.name, outcome, width = width);
        for approval in &stage.approvals {
            let _ = write!(out, "  [approval: {}]", approval);
        }
        if let Some(guard) = &stage.guard {
            let _ = write!(out, "  [guard: {} == {}]", guard.variable, guard.expected);
        }
        out.push('\n');
    }
    out
}
