//! engine
//!
//! Runs the update pipeline across every tagged repository.
//!
//! # Architecture
//!
//! - [`Pipeline`] takes one repository from "is an update request already
//!   open?" to "update request opened", and returns a typed
//!   [`RunOutcome`] or a [`PipelineError`] naming the failed step
//! - [`Orchestrator`] lists candidates, fans runs out under a concurrency
//!   bound and a per-repository deadline, and collects a [`BatchReport`]
//!
//! Components are shared read-only through `Arc`. Repository runs share
//! no mutable state, so a failing, hanging or panicking run affects only
//! its own report entry.
//!
//! # Example
//!
//! ```ignore
//! use upkeep::core::config::Config;
//! use upkeep::engine::Orchestrator;
//!
//! let config = Config::load(None)?;
//! let orchestrator = Orchestrator::from_config(&config)?;
//! let report = orchestrator.run_batch().await;
//! println!("{} updated, {} failed", report.updated(), report.failed());
//! ```

mod orchestrator;
mod pipeline;
mod report;

pub use orchestrator::Orchestrator;
pub use pipeline::{commit_message, Pipeline, PipelineError, RunOutcome, Step, StepError};
pub use report::{BatchReport, BatchSummary, FailureSummary, RepoReport};
