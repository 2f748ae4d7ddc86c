//! Subcommands of the `learn-infra` binary

pub mod check_trigger;
pub mod plan;
pub mod synth;
