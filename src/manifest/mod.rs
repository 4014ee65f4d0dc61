//! manifest
//!
//! Ecosystem-specific dependency manifests.
//!
//! # Design
//!
//! A [`DependencyManager`] owns the parsed representation of one manifest
//! file for the duration of a single repository run:
//!
//! 1. [`parse`](DependencyManager::parse) the raw bytes into a [`DependencySet`]
//! 2. look up candidates with [`latest_version`](DependencyManager::latest_version)
//! 3. [`mutate`](DependencyManager::mutate) each decided update
//! 4. [`serialize`](DependencyManager::serialize) back to bytes
//!
//! Managers are stateful and never shared between runs; the pipeline
//! creates a fresh one from a [`ManagerKind`] for every repository.
//!
//! # Modules
//!
//! - [`gomod`]: Go modules (`go.mod`)

pub mod gomod;

pub use gomod::GoModManager;

use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::types::{Dependency, DependencySet};
use crate::registry::{LookupError, VersionSource};

/// Errors from manifest handling.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    /// The manifest is malformed. No partial dependency set is produced.
    #[error("failed to parse {file}: {message}")]
    Parse { file: &'static str, message: String },

    /// A decided dependency is not declared in the manifest.
    #[error("dependency '{0}' not found in manifest")]
    NotFound(String),

    /// The manifest cannot be written back.
    #[error("failed to serialize {file}: {message}")]
    Serialize { file: &'static str, message: String },
}

/// Parser, version oracle and editor for one manifest format.
#[async_trait]
pub trait DependencyManager: Send + Sync {
    /// Manager name for logs (e.g., "go").
    fn name(&self) -> &'static str;

    /// Manifest path relative to the repository root.
    fn manifest_file_name(&self) -> &'static str;

    /// Parse the manifest and return its direct dependencies in
    /// declaration order.
    fn parse(&mut self, contents: &[u8]) -> Result<DependencySet, ManifestError>;

    /// Newest released version of a dependency; `None` if it has no
    /// stable release.
    async fn latest_version(&self, dep: &Dependency) -> Result<Option<Version>, LookupError>;

    /// Replace the declared version of `dep.name` with `dep.version`.
    fn mutate(&mut self, dep: &Dependency) -> Result<(), ManifestError>;

    /// The manifest bytes, identical to the input except for mutated versions.
    fn serialize(&self) -> Result<Vec<u8>, ManifestError>;
}

/// Supported manifest formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerKind {
    Go,
}

impl ManagerKind {
    /// Parse a configured manager name (case-insensitive, with aliases).
    ///
    /// # Example
    ///
    /// ```
    /// use upkeep::manifest::ManagerKind;
    ///
    /// assert_eq!(ManagerKind::parse("golang"), Some(ManagerKind::Go));
    /// assert_eq!(ManagerKind::parse("npm"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "go" | "golang" | "gomod" => Some(ManagerKind::Go),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ManagerKind::Go => "go",
        }
    }

    /// Manifest path this kind looks for.
    pub fn manifest_file_name(&self) -> &'static str {
        match self {
            ManagerKind::Go => gomod::GO_MOD,
        }
    }

    /// Create a fresh manager for one run.
    pub fn create(&self, source: Arc<dyn VersionSource>) -> Box<dyn DependencyManager> {
        match self {
            ManagerKind::Go => Box::new(GoModManager::new(source)),
        }
    }
}

impl std::fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Resolve configured manager names, preserving order and dropping repeats.
///
/// # Errors
///
/// `ConfigError::Unsupported` for an unknown name.
pub fn resolve_managers(names: &[String]) -> Result<Vec<ManagerKind>, ConfigError> {
    let mut kinds = Vec::new();
    for name in names {
        let kind = ManagerKind::parse(name).ok_or_else(|| unsupported(name))?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

/// Create a manager by configured name.
pub fn create_manager(
    name: &str,
    source: Arc<dyn VersionSource>,
) -> Result<Box<dyn DependencyManager>, ConfigError> {
    let kind = ManagerKind::parse(name).ok_or_else(|| unsupported(name))?;
    Ok(kind.create(source))
}

fn unsupported(name: &str) -> ConfigError {
    ConfigError::Unsupported {
        kind: "dependency manager",
        name: name.to_string(),
        available: valid_manager_names().to_vec(),
    }
}

/// Valid manager names for configuration validation.
pub fn valid_manager_names() -> &'static [&'static str] {
    &["go", "golang", "gomod"]
}
