//! Upkeep - a bot that keeps dependencies of tagged repositories current
//!
//! Upkeep periodically lists the repositories carrying a topic tag on a
//! forge (GitLab or GitHub), and for each one: checks whether an update
//! request is already open, clones it, parses its dependency manifest,
//! asks a policy which dependencies to move, rewrites the manifest,
//! commits, pushes an update branch and opens a merge/pull request.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, starts the engine)
//! - [`engine`] - Per-repository pipeline and the batch orchestrator
//! - [`core`] - Domain types and configuration
//! - [`git`] - Single interface for all Git operations
//! - [`forge`] - Abstraction for remote forges (GitLab, GitHub)
//! - [`manifest`] - Dependency manifest parsing and rewriting
//! - [`registry`] - Latest-version lookups
//! - [`policy`] - Which dependencies get updated
//!
//! # Correctness Invariants
//!
//! 1. At most one outstanding update request per repository
//! 2. A manifest is rewritten only at the versions of the dependencies
//!    being updated; every other byte is preserved
//! 3. A failure in one repository never affects another
//! 4. Working copies never outlive their run

pub mod cli;
pub mod core;
pub mod engine;
pub mod forge;
pub mod git;
pub mod manifest;
pub mod policy;
pub mod registry;
