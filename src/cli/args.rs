//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Upkeep - keeps the dependencies of tagged repositories up to date
#[derive(Parser, Debug)]
#[command(name = "upkeep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Config path given to the subcommand, if any.
    pub fn config_path(&self) -> Option<&PathBuf> {
        match &self.command {
            Command::Run { config, .. } | Command::CheckConfig { config } => config.as_ref(),
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll tagged repositories and open dependency update requests
    #[command(
        name = "run",
        long_about = "Poll tagged repositories and open dependency update requests.\n\n\
            The first batch starts immediately; further batches run every \
            poll_interval_secs. Ctrl-C or SIGTERM stops scheduling and lets the \
            batch in progress finish.",
        after_help = "\
EXAMPLES:
    # Run as a service
    upkeep run --config /etc/upkeep/config.toml

    # Process every tagged repository once and exit
    upkeep run --once

    # Verbose single pass
    RUST_LOG=upkeep=debug upkeep run --once"
    )]
    Run {
        /// Configuration file (default: $UPKEEP_CONFIG, then the user config dir)
        #[arg(long, env = "UPKEEP_CONFIG", value_name = "PATH")]
        config: Option<PathBuf>,

        /// Run a single batch and exit (non-zero if any repository failed)
        #[arg(long)]
        once: bool,
    },

    /// Load and validate configuration, then print the resolved settings
    #[command(name = "check-config")]
    CheckConfig {
        /// Configuration file (default: $UPKEEP_CONFIG, then the user config dir)
        #[arg(long, env = "UPKEEP_CONFIG", value_name = "PATH")]
        config: Option<PathBuf>,
    },
}
