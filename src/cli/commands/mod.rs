//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Async Commands
//!
//! `run` drives the async engine. The dispatch function stays synchronous
//! and the handler owns its tokio runtime.

mod check_config;
mod run;

pub use check_config::{check_config, describe};
pub use run::run;

use super::args::Command;
use crate::core::config::Config;
use anyhow::Result;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Run { once, .. } => run::run(config, once),
        Command::CheckConfig { .. } => check_config::check_config(config),
    }
}
