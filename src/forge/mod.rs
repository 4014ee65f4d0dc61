//! forge
//!
//! Abstraction for remote hosting providers (GitLab, GitHub).
//!
//! # Architecture
//!
//! The [`RemoteHandler`] trait defines everything the update pipeline needs
//! from a provider. The orchestrator obtains its handler through
//! [`create_remote`] and never imports a concrete implementation.
//!
//! Remote failures never compromise local state: a failed call ends the
//! current repository run (or batch, for discovery) and nothing else.
//!
//! # Modules
//!
//! - `traits`: [`RemoteHandler`], [`ForgeError`] and [`UpdateRequest`]
//! - [`gitlab`]: GitLab REST v4 implementation
//! - [`github`]: GitHub REST v3 implementation
//! - [`mock`]: In-memory implementation for deterministic testing
//! - `factory`: Provider selection from configuration

mod factory;
pub mod github;
pub mod gitlab;
pub mod mock;
mod traits;

pub use factory::{create_remote, valid_forge_names, ForgeProvider};
pub use traits::*;
