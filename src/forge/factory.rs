//! forge::factory
//!
//! Remote handler selection and creation.
//!
//! # Design
//!
//! The orchestrator never names a concrete provider: it receives the
//! `Arc<dyn RemoteHandler>` built here from the configured
//! `remote_provider`. Provider names are matched case-insensitively.
//!
//! # Example
//!
//! ```ignore
//! use upkeep::forge::create_remote;
//!
//! let remote = create_remote(&config)?;
//! let repos = remote.list_candidates("upkeep").await?;
//! ```

use std::sync::Arc;

use super::github::GitHubForge;
use super::gitlab::GitLabForge;
use super::traits::{ForgeError, RemoteHandler};
use crate::core::config::{Config, ConfigError};

/// Supported remote providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeProvider {
    GitLab,
    GitHub,
}

impl ForgeProvider {
    /// All supported providers, in documentation order.
    pub fn all() -> &'static [ForgeProvider] {
        &[ForgeProvider::GitLab, ForgeProvider::GitHub]
    }

    /// Provider name as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            ForgeProvider::GitLab => "gitlab",
            ForgeProvider::GitHub => "github",
        }
    }

    /// Parse a provider from a string.
    ///
    /// # Example
    ///
    /// ```
    /// use upkeep::forge::ForgeProvider;
    ///
    /// assert_eq!(ForgeProvider::parse("GitLab"), Some(ForgeProvider::GitLab));
    /// assert_eq!(ForgeProvider::parse("bitbucket"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gitlab" => Some(ForgeProvider::GitLab),
            "github" => Some(ForgeProvider::GitHub),
            _ => None,
        }
    }
}

impl std::fmt::Display for ForgeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Create the configured remote handler.
///
/// # Errors
///
/// - `ConfigError::Unsupported` for an unknown provider name
/// - `ConfigError::MissingSection` / `MissingSecret` when the provider's
///   section or token is absent
/// - `ConfigError::InvalidValue` if the HTTP client cannot be built
pub fn create_remote(config: &Config) -> Result<Arc<dyn RemoteHandler>, ConfigError> {
    let name = config.remote_provider_name()?;
    let provider = ForgeProvider::parse(name).ok_or_else(|| ConfigError::Unsupported {
        kind: "remote provider",
        name: name.to_string(),
        available: valid_forge_names().to_vec(),
    })?;

    let remote: Arc<dyn RemoteHandler> = match provider {
        ForgeProvider::GitLab => Arc::new(
            GitLabForge::new(&config.gitlab()?, config.request()).map_err(forge_config_error)?,
        ),
        ForgeProvider::GitHub => Arc::new(
            GitHubForge::new(&config.github()?, config.request()).map_err(forge_config_error)?,
        ),
    };
    Ok(remote)
}

fn forge_config_error(err: ForgeError) -> ConfigError {
    ConfigError::InvalidValue(format!("cannot create remote handler: {err}"))
}

/// Valid provider names for configuration validation.
pub fn valid_forge_names() -> &'static [&'static str] {
    &["gitlab", "github"]
}
