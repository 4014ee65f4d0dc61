//! core::config::schema
//!
//! Configuration file schema.
//!
//! Every field is optional at the file level; defaults and validation are
//! applied by [`Config`](super::Config) when the file is resolved into
//! per-component settings.
//!
//! # Example
//!
//! ```toml
//! filter_tag = "upkeep"
//! policy = "simple"
//! remote_provider = "gitlab"
//! managers = ["go"]
//! poll_interval_secs = 300
//! max_concurrent = 4
//!
//! [git]
//! branch = "upkeep/dependency-update"
//! commit_prefix = "[Upkeep]"
//! author = { name = "Upkeep Bot", email = "upkeep@example.com" }
//! auth = { username = "oauth2", password_env = "UPKEEP_GIT_TOKEN" }
//!
//! [request]
//! title = "[Upkeep] Dependency Update"
//! remove_source_branch = true
//! squash = false
//!
//! [gitlab]
//! url = "https://gitlab.example.com"
//! token_env = "GITLAB_TOKEN"
//! ```

use serde::{Deserialize, Serialize};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Topic/tag that marks a repository as managed
    pub filter_tag: Option<String>,

    /// Update policy name (default: "simple")
    pub policy: Option<String>,

    /// Remote provider name ("gitlab" or "github")
    pub remote_provider: Option<String>,

    /// Enabled dependency managers, tried in order (default: ["go"])
    pub managers: Option<Vec<String>>,

    /// Seconds between polling batches
    pub poll_interval_secs: Option<u64>,

    /// Maximum repositories processed in parallel within a batch
    pub max_concurrent: Option<usize>,

    /// Hard deadline for a single repository run
    pub repo_timeout_secs: Option<u64>,

    /// Fail the run when a decided dependency is missing at apply time
    pub strict_apply: Option<bool>,

    /// Default log filter when `RUST_LOG` is unset
    pub log_level: Option<String>,

    pub git: Option<GitSection>,
    pub request: Option<RequestSection>,
    pub gitlab: Option<GitLabSection>,
    pub github: Option<GitHubSection>,
    pub registry: Option<RegistrySection>,
}

/// `[git]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GitSection {
    /// Update branch name
    pub branch: Option<String>,
    /// Prefix of every commit summary line
    pub commit_prefix: Option<String>,
    pub author: Option<AuthorSection>,
    pub auth: Option<AuthSection>,
}

/// Commit author identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorSection {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// HTTPS credentials used for clone and push.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSection {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Environment variable holding the password
    pub password_env: Option<String>,
}

/// `[request]` section: shape of opened update requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RequestSection {
    /// Request title; doubles as the marker used to detect open requests
    pub title: Option<String>,
    pub remove_source_branch: Option<bool>,
    pub squash: Option<bool>,
}

/// `[gitlab]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GitLabSection {
    /// Instance URL, without the `/api/v4` suffix
    pub url: Option<String>,
    pub token: Option<String>,
    pub token_env: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// `[github]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubSection {
    pub api_base: Option<String>,
    pub token: Option<String>,
    pub token_env: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// `[registry]` section: the version source used by dependency managers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySection {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}
