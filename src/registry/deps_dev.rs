//! registry::deps_dev
//!
//! Version source backed by the deps.dev v3 API.
//!
//! `GET {base}/v3/systems/{system}/packages/{name}` lists every known
//! version of a package. The package name is a single, percent-encoded
//! path segment (`github.com/pkg/errors` becomes `github.com%2Fpkg%2Ferrors`).
//!
//! The newest version by semver precedence wins; pre-releases (including
//! Go pseudo-versions) are ignored.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use semver::Version;
use serde::Deserialize;
use tracing::debug;

use super::{parse_version, LookupError, VersionSource};
use crate::core::config::RegistrySettings;

/// deps.dev API client.
#[derive(Debug, Clone)]
pub struct DepsDevClient {
    client: Client,
    base_url: Url,
}

impl DepsDevClient {
    /// Create a client for the configured registry.
    ///
    /// # Errors
    ///
    /// `Network` if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(settings: &RegistrySettings) -> Result<Self, LookupError> {
        let base_url = Url::parse(&settings.url)
            .map_err(|e| LookupError::Network(format!("invalid registry url: {e}")))?;
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| LookupError::Network(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    /// URL of the package endpoint.
    fn package_url(&self, system: &str, name: &str) -> Result<Url, LookupError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                LookupError::Network(format!("registry url cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(["v3", "systems", system, "packages", name]);
        Ok(url)
    }
}

#[async_trait]
impl VersionSource for DepsDevClient {
    async fn latest_release(
        &self,
        ecosystem: &str,
        name: &str,
    ) -> Result<Option<Version>, LookupError> {
        let url = self.package_url(ecosystem, name)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LookupError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LookupError::Registry {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        let package: PackageResponse =
            response.json().await.map_err(|e| LookupError::Registry {
                status: status.as_u16(),
                message: format!("Failed to parse response: {e}"),
            })?;

        let latest = newest_stable(name, &package);
        match &latest {
            Some(version) => debug!(package = name, version = %version, "resolved latest release"),
            None => debug!(package = name, "no stable release"),
        }
        Ok(latest)
    }
}

/// Newest non-prerelease version in a package listing, by semver precedence
/// (build metadata such as `+incompatible` does not order).
///
/// Unparseable version strings are skipped; the registry carries historic
/// tags that are not valid semver.
fn newest_stable(name: &str, package: &PackageResponse) -> Option<Version> {
    package
        .versions
        .iter()
        .filter_map(|v| parse_version(name, &v.version_key.version).ok())
        .filter(|v| v.pre.is_empty())
        .max_by(Version::cmp_precedence)
}

#[derive(Debug, Deserialize)]
struct PackageResponse {
    #[serde(default)]
    versions: Vec<PackageVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageVersion {
    version_key: VersionKey,
}

#[derive(Debug, Deserialize)]
struct VersionKey {
    version: String,
}
