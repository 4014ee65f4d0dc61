//! core
//!
//! Core domain types and configuration.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Repository, Dependency, UpdateDecision
//! - [`config`] - Configuration schema, loading and per-component settings

pub mod config;
pub mod types;
