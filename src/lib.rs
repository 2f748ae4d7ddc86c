// learn-infra - CLI glue over the synthesizer
//
// Command implementations live here so they can be unit tested; main.rs only
// parses arguments, loads settings, and dispatches.

pub mod commands;
mod init;

pub use init::init_tracing;
