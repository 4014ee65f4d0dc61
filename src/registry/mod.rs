//! registry
//!
//! Sources of "latest released version" information.
//!
//! # Design
//!
//! A [`VersionSource`] answers one question: what is the newest
//! non-prerelease version of a package in an ecosystem? Dependency managers
//! hold an `Arc<dyn VersionSource>` and delegate `latest_version` to it.
//!
//! Lookup failures are always errors. A source never reports a zero or
//! placeholder version in place of "unknown". A package that exists but only
//! carries pre-releases or pseudo-versions is `Ok(None)`: it has no update
//! candidate, which is not a failure.
//!
//! # Modules
//!
//! - [`deps_dev`]: HTTP client for the deps.dev v3 API
//! - `StaticVersionSource`: in-memory table for tests and dry runs

pub mod deps_dev;

pub use deps_dev::DepsDevClient;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use semver::Version;
use thiserror::Error;

/// Errors from version lookups.
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    /// The package is unknown to the registry.
    #[error("package '{0}' not found in registry")]
    NotFound(String),

    /// A version string from the registry could not be parsed.
    #[error("invalid version '{version}' for package '{name}': {message}")]
    InvalidVersion {
        name: String,
        version: String,
        message: String,
    },

    /// The registry returned an unexpected status.
    #[error("registry error: {status} - {message}")]
    Registry { status: u16, message: String },

    /// Network or connection error.
    #[error("network error: {0}")]
    Network(String),
}

/// Source of the newest released version of a package.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Newest non-prerelease version of `name` in `ecosystem` (e.g. "go"),
    /// or `None` if the package has no stable release.
    async fn latest_release(
        &self,
        ecosystem: &str,
        name: &str,
    ) -> Result<Option<Version>, LookupError>;
}

/// Parse a registry version string, tolerating a leading `v`.
pub(crate) fn parse_version(name: &str, raw: &str) -> Result<Version, LookupError> {
    let trimmed = raw.strip_prefix('v').unwrap_or(raw);
    Version::parse(trimmed).map_err(|e| LookupError::InvalidVersion {
        name: name.to_string(),
        version: raw.to_string(),
        message: e.to_string(),
    })
}

/// In-memory version source.
///
/// Packages without an entry report [`LookupError::NotFound`]; packages
/// registered with [`with_failure`](Self::with_failure) report a network
/// error and [`without_release`](Self::without_release) ones report `None`. The number of lookups is counted for test assertions.
#[derive(Debug, Default)]
pub struct StaticVersionSource {
    versions: HashMap<String, Result<Option<Version>, LookupError>>,
    lookups: AtomicUsize,
}

impl StaticVersionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the latest version of a package.
    ///
    /// # Panics
    ///
    /// Panics if `version` is not valid semver; intended for fixtures.
    pub fn with(mut self, name: &str, version: &str) -> Self {
        let version = parse_version(name, version)
            .unwrap_or_else(|e| panic!("invalid fixture version: {e}"));
        self.versions.insert(name.to_string(), Ok(Some(version)));
        self
    }

    /// Register a package that has no stable release.
    pub fn without_release(mut self, name: &str) -> Self {
        self.versions.insert(name.to_string(), Ok(None));
        self
    }

    /// Make lookups of `name` fail.
    pub fn with_failure(mut self, name: &str) -> Self {
        self.versions.insert(
            name.to_string(),
            Err(LookupError::Network(format!("lookup of {name} failed"))),
        );
        self
    }

    /// Number of lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionSource for StaticVersionSource {
    async fn latest_release(
        &self,
        _ecosystem: &str,
        name: &str,
    ) -> Result<Option<Version>, LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match self.versions.get(name) {
            Some(result) => result.clone(),
            None => Err(LookupError::NotFound(name.to_string())),
        }
    }
}
