//! cli
//!
//! Command-line interface layer for Upkeep.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and initialise logging
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap, resolves the
//! [`Config`](crate::core::config::Config) and hands it to the
//! [`crate::engine`]. Configuration errors surface here and end the process
//! with a non-zero exit code.

pub mod args;
pub mod commands;

pub use args::{Cli, Command};

use anyhow::{Context as _, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::config::Config;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let config = Config::load(cli.config_path().map(|p| p.as_path()))
        .context("Failed to load configuration")?;

    init_logging(config.log_level(), cli.debug);

    commands::dispatch(cli.command, &config)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins; otherwise `--debug` or the configured level applies to
/// this crate, with everything else at `warn`.
fn init_logging(level: &str, debug: bool) {
    let level = if debug { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,upkeep={}", level)));

    // A second init (tests driving `run` twice) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}
