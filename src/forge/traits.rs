//! forge::traits
//!
//! Remote handler trait for interacting with hosting providers.
//!
//! # Design
//!
//! The `RemoteHandler` trait is async because every operation involves
//! network I/O. It covers exactly what the update pipeline needs from a
//! provider:
//!
//! - discover managed repositories (by topic/tag)
//! - detect an already-open update request (idempotency guard)
//! - open a new update request
//!
//! Failures are reported as [`ForgeError`] and never affect local state.
//!
//! # Example
//!
//! ```ignore
//! use upkeep::forge::RemoteHandler;
//!
//! async fn propose(remote: &dyn RemoteHandler, repo: &Repository) -> Result<(), ForgeError> {
//!     if remote.has_open_update_request(repo).await? {
//!         return Ok(());
//!     }
//!     remote
//!         .open_update_request(repo, "upkeep/dependency-update", repo.default_branch.as_str())
//!         .await
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::core::config::RequestSettings;
use crate::core::types::Repository;

/// Errors from forge operations.
///
/// These error types map to common failure modes when interacting
/// with remote hosting services.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    /// Authentication is required but not available.
    #[error("authentication required")]
    AuthRequired,

    /// Authentication failed (invalid token, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),
}

/// An update request (merge request / pull request) to be opened.
///
/// Built fresh for every successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Branch carrying the dependency updates
    pub source_branch: String,
    /// Branch to merge into (the repository's default branch)
    pub target_branch: String,
    /// Title; always the configured marker text
    pub title: String,
    /// Delete the source branch once merged
    pub remove_source_branch: bool,
    /// Squash commits on merge
    pub squash: bool,
}

impl UpdateRequest {
    /// Build a request from the configured request settings.
    pub fn new(
        settings: &RequestSettings,
        source_branch: impl Into<String>,
        target_branch: impl Into<String>,
    ) -> Self {
        Self {
            source_branch: source_branch.into(),
            target_branch: target_branch.into(),
            title: settings.title.clone(),
            remove_source_branch: settings.remove_source_branch,
            squash: settings.squash,
        }
    }
}

/// Handler for a remote git hosting provider.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: one handler is shared by every
/// concurrent repository run.
///
/// # Error Handling
///
/// All methods return `Result<T, ForgeError>`. The orchestrator treats any
/// error as local to the repository being processed (or to the batch, for
/// [`list_candidates`](RemoteHandler::list_candidates)).
#[async_trait]
pub trait RemoteHandler: Send + Sync {
    /// Provider name (e.g., "gitlab", "github").
    fn name(&self) -> &'static str;

    /// Repositories visible to the configured identity that carry `filter_tag`.
    ///
    /// Repositories without a default branch (empty repositories) are
    /// omitted.
    async fn list_candidates(&self, filter_tag: &str) -> Result<Vec<Repository>, ForgeError>;

    /// Whether an open update request carries this system's marker title.
    ///
    /// This is the idempotency guard: while it returns `true`, no further
    /// work is done for the repository.
    async fn has_open_update_request(&self, repo: &Repository) -> Result<bool, ForgeError>;

    /// Open an update request from `source_branch` into `target_branch`.
    ///
    /// The title is the configured marker text and the configured
    /// remove-source-branch / squash flags are applied. Only the provider's
    /// "created" response counts as success.
    async fn open_update_request(
        &self,
        repo: &Repository,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<(), ForgeError>;
}
