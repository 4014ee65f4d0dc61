//! core::config
//!
//! Configuration loading and resolution.
//!
//! # Overview
//!
//! The bot is configured from a single TOML file. The file is parsed into
//! [`ConfigFile`] and then resolved into small per-component settings
//! values ([`GitSettings`], [`RequestSettings`], [`SchedulerSettings`],
//! ...). Components receive only the settings they need through their
//! constructors; nothing reads configuration globally.
//!
//! # Locations
//!
//! Searched in order:
//! 1. An explicit path (`--config`)
//! 2. `$UPKEEP_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/upkeep/config.toml`
//! 4. `<platform config dir>/upkeep/config.toml`
//!
//! # Secrets
//!
//! Tokens and passwords may be written inline or referenced through an
//! environment variable (`token_env`, `password_env`). Inline values win.
//!
//! # Example
//!
//! ```
//! use upkeep::core::config::Config;
//!
//! let config = Config::from_toml_str(r#"
//!     remote_provider = "gitlab"
//!     [gitlab]
//!     token = "glpat-xxx"
//! "#).unwrap();
//!
//! assert_eq!(config.policy_name(), "simple");
//! assert_eq!(config.scheduler().filter_tag, "upkeep");
//! ```

pub mod schema;

pub use schema::ConfigFile;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::types::BranchName;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "UPKEEP_CONFIG";

const DEFAULT_FILTER_TAG: &str = "upkeep";
const DEFAULT_POLICY: &str = "simple";
const DEFAULT_BRANCH: &str = "upkeep/dependency-update";
const DEFAULT_COMMIT_PREFIX: &str = "[Upkeep]";
const DEFAULT_TITLE: &str = "[Upkeep] Dependency Update";
const DEFAULT_AUTHOR_NAME: &str = "Upkeep Bot";
const DEFAULT_AUTHOR_EMAIL: &str = "upkeep@localhost";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
const DEFAULT_MAX_CONCURRENT: usize = 4;
const DEFAULT_REPO_TIMEOUT_SECS: u64 = 600;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";
const DEFAULT_GITHUB_API: &str = "https://api.github.com";
const DEFAULT_REGISTRY_URL: &str = "https://api.deps.dev";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("no config file found (use --config or set $UPKEEP_CONFIG)")]
    NotFound,

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("missing config section [{0}]")]
    MissingSection(&'static str),

    #[error("missing secret '{key}'{}", env_hint(.env))]
    MissingSecret { key: String, env: Option<String> },

    /// A named variant (policy, provider, manager) is not known.
    #[error("unsupported {kind} '{name}', must be one of: {}", .available.join(", "))]
    Unsupported {
        kind: &'static str,
        name: String,
        available: Vec<&'static str>,
    },
}

fn env_hint(env: &Option<String>) -> String {
    match env {
        Some(var) => format!(" (environment variable {var} is not set)"),
        None => String::new(),
    }
}

/// Commit author and committer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorIdentity {
    pub name: String,
    pub email: String,
}

/// HTTPS credentials for clone and push.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

// Custom Debug to avoid exposing the password
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("has_password", &!self.password.is_empty())
            .finish()
    }
}

/// Settings consumed by the git workflow.
#[derive(Debug, Clone)]
pub struct GitSettings {
    /// Branch the updates are committed to
    pub branch: BranchName,
    /// Prefix of every commit summary line
    pub commit_prefix: String,
    pub author: AuthorIdentity,
    pub credentials: Credentials,
}

/// Shape of update requests and the marker used to find them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSettings {
    pub title: String,
    pub remove_source_branch: bool,
    pub squash: bool,
}

/// Settings consumed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub filter_tag: String,
    pub poll_interval: Duration,
    pub max_concurrent: usize,
    pub repo_timeout: Duration,
    pub strict_apply: bool,
}

/// Connection settings for a forge API.
#[derive(Clone, PartialEq, Eq)]
pub struct ForgeSettings {
    /// Base URL (GitLab instance URL or GitHub API base)
    pub url: String,
    pub token: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for ForgeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgeSettings")
            .field("url", &self.url)
            .field("has_token", &!self.token.is_empty())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Settings for the package registry queried for latest versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    pub url: String,
    pub timeout: Duration,
}

/// Resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Raw file contents
    pub file: ConfigFile,
    /// Path the file was loaded from (if any)
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from an explicit path or the default locations.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NotFound`] if no file exists at any location
    /// - [`ConfigError::ReadError`] / [`ConfigError::ParseError`] for unreadable files
    /// - Any validation error from [`Config::validate`]
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::discover().ok_or(ConfigError::NotFound)?,
        };

        let contents = fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let config = Self {
            file,
            path: Some(path),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        let config = Self { file, path: None };
        config.validate()?;
        Ok(config)
    }

    fn discover() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("upkeep/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::config_dir()
            .map(|dir| dir.join("upkeep/config.toml"))
            .filter(|path| path.exists())
    }

    /// Path the configuration was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Validate names, numeric ranges and the selected provider's section.
    ///
    /// Configuration errors are fatal: the process must not start with an
    /// invalid configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_known(
            "policy",
            self.policy_name(),
            crate::policy::valid_policy_names(),
        )?;
        check_known(
            "remote provider",
            self.remote_provider_name()?,
            crate::forge::valid_forge_names(),
        )?;
        for manager in self.manager_names() {
            check_known("dependency manager", &manager, crate::manifest::valid_manager_names())?;
        }

        let f = &self.file;
        if f.poll_interval_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "poll_interval_secs must be greater than zero".into(),
            ));
        }
        if f.max_concurrent == Some(0) {
            return Err(ConfigError::InvalidValue(
                "max_concurrent must be greater than zero".into(),
            ));
        }
        if f.repo_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "repo_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.manager_names().is_empty() {
            return Err(ConfigError::InvalidValue(
                "managers must list at least one dependency manager".into(),
            ));
        }
        if self.request().title.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "request title cannot be empty".into(),
            ));
        }

        self.branch()?;
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Update policy name as written, empty when unset. The policy factory
    /// applies (and warns about) the default.
    pub fn configured_policy(&self) -> &str {
        self.file.policy.as_deref().unwrap_or("")
    }

    /// Update policy name. Defaults to "simple".
    pub fn policy_name(&self) -> &str {
        match self.file.policy.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => DEFAULT_POLICY,
        }
    }

    /// Remote provider name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if no provider is configured.
    pub fn remote_provider_name(&self) -> Result<&str, ConfigError> {
        self.file
            .remote_provider
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ConfigError::InvalidValue("remote_provider is required".into()))
    }

    /// Enabled dependency manager names, in detection order.
    pub fn manager_names(&self) -> Vec<String> {
        self.file
            .managers
            .clone()
            .unwrap_or_else(|| vec!["go".to_string()])
    }

    /// Default log filter. Defaults to "info".
    pub fn log_level(&self) -> &str {
        self.file.log_level.as_deref().unwrap_or("info")
    }

    fn branch(&self) -> Result<BranchName, ConfigError> {
        let name = self
            .file
            .git
            .as_ref()
            .and_then(|g| g.branch.as_deref())
            .unwrap_or(DEFAULT_BRANCH);
        BranchName::new(name).map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    /// Settings for the git workflow.
    pub fn git(&self) -> Result<GitSettings, ConfigError> {
        let git = self.file.git.clone().unwrap_or_default();
        let author = git.author.unwrap_or_default();
        let auth = git.auth.unwrap_or_default();

        let password = match (auth.password, auth.password_env) {
            (Some(inline), _) => inline,
            (None, Some(var)) => resolve_env("git.auth.password", &var)?,
            (None, None) => String::new(),
        };

        Ok(GitSettings {
            branch: self.branch()?,
            commit_prefix: git
                .commit_prefix
                .unwrap_or_else(|| DEFAULT_COMMIT_PREFIX.to_string()),
            author: AuthorIdentity {
                name: author.name.unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_string()),
                email: author
                    .email
                    .unwrap_or_else(|| DEFAULT_AUTHOR_EMAIL.to_string()),
            },
            credentials: Credentials {
                username: auth.username.unwrap_or_else(|| "oauth2".to_string()),
                password,
            },
        })
    }

    /// Settings for opened update requests.
    pub fn request(&self) -> RequestSettings {
        let request = self.file.request.clone().unwrap_or_default();
        RequestSettings {
            title: request.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            remove_source_branch: request.remove_source_branch.unwrap_or(true),
            squash: request.squash.unwrap_or(false),
        }
    }

    /// Settings for the orchestrator.
    pub fn scheduler(&self) -> SchedulerSettings {
        let f = &self.file;
        SchedulerSettings {
            filter_tag: f
                .filter_tag
                .clone()
                .unwrap_or_else(|| DEFAULT_FILTER_TAG.to_string()),
            poll_interval: Duration::from_secs(
                f.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            ),
            max_concurrent: f.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT),
            repo_timeout: Duration::from_secs(
                f.repo_timeout_secs.unwrap_or(DEFAULT_REPO_TIMEOUT_SECS),
            ),
            strict_apply: f.strict_apply.unwrap_or(false),
        }
    }

    /// Connection settings for GitLab.
    ///
    /// # Errors
    ///
    /// `MissingSection` if `[gitlab]` is absent, `MissingSecret` if no token resolves.
    pub fn gitlab(&self) -> Result<ForgeSettings, ConfigError> {
        let section = self
            .file
            .gitlab
            .as_ref()
            .ok_or(ConfigError::MissingSection("gitlab"))?;
        Ok(ForgeSettings {
            url: section
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_GITLAB_URL.to_string()),
            token: resolve_secret("gitlab.token", &section.token, &section.token_env)?,
            timeout: Duration::from_secs(section.timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)),
        })
    }

    /// Connection settings for GitHub.
    pub fn github(&self) -> Result<ForgeSettings, ConfigError> {
        let section = self
            .file
            .github
            .as_ref()
            .ok_or(ConfigError::MissingSection("github"))?;
        Ok(ForgeSettings {
            url: section
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_GITHUB_API.to_string()),
            token: resolve_secret("github.token", &section.token, &section.token_env)?,
            timeout: Duration::from_secs(section.timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)),
        })
    }

    /// Settings for the version registry.
    pub fn registry(&self) -> RegistrySettings {
        let section = self.file.registry.clone().unwrap_or_default();
        RegistrySettings {
            url: section
                .url
                .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string()),
            timeout: Duration::from_secs(section.timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)),
        }
    }
}

fn check_known(
    kind: &'static str,
    name: &str,
    available: &'static [&'static str],
) -> Result<(), ConfigError> {
    if available.contains(&name.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ConfigError::Unsupported {
            kind,
            name: name.to_string(),
            available: available.to_vec(),
        })
    }
}

fn resolve_secret(
    key: &str,
    inline: &Option<String>,
    env: &Option<String>,
) -> Result<String, ConfigError> {
    match (inline, env) {
        (Some(value), _) if !value.is_empty() => Ok(value.clone()),
        (_, Some(var)) => resolve_env(key, var),
        _ => Err(ConfigError::MissingSecret {
            key: key.to_string(),
            env: None,
        }),
    }
}

fn resolve_env(key: &str, var: &str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingSecret {
            key: key.to_string(),
            env: Some(var.to_string()),
        }),
    }
}
