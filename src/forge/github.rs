//! forge::github
//!
//! GitHub remote handler using the REST v3 API.
//!
//! # Endpoints
//!
//! - `GET  /user/repos` - candidate discovery, filtered client-side by topic
//! - `GET  /repos/:owner/:repo/pulls?state=open` - idempotency check
//! - `POST /repos/:owner/:repo/pulls` - open a pull request (`201 Created` only)
//!
//! Repository ids are the `owner/repo` full name.
//!
//! # Limitations
//!
//! GitHub has no per-request "remove source branch" or "squash" flags.
//! Both settings are ignored here; configure them on the repository
//! instead (auto-delete head branches, allowed merge methods).
//!
//! # Rate Limiting
//!
//! Returns `ForgeError::RateLimited` when limits are hit. Retrying is left
//! to the next polling batch.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::gitlab::USER_AGENT_VALUE;
use super::traits::{ForgeError, RemoteHandler, UpdateRequest};
use crate::core::config::{ForgeSettings, RequestSettings};
use crate::core::types::{BranchName, RepoId, Repository};

/// Page size for list endpoints (GitHub maximum).
const PER_PAGE: usize = 100;

/// GitHub remote handler.
pub struct GitHubForge {
    client: Client,
    api_base: String,
    token: String,
    request: RequestSettings,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("api_base", &self.api_base)
            .field("has_token", &!self.token.is_empty())
            .finish()
    }
}

impl GitHubForge {
    /// Create a GitHub handler.
    ///
    /// # Errors
    ///
    /// - `AuthRequired` if the token is empty
    /// - `NetworkError` if the HTTP client cannot be built
    pub fn new(settings: &ForgeSettings, request: RequestSettings) -> Result<Self, ForgeError> {
        if settings.token.is_empty() {
            return Err(ForgeError::AuthRequired);
        }
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            api_base: settings.url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            request,
        })
    }

    /// API base URL this handler talks to.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn headers(&self) -> Result<HeaderMap, ForgeError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| ForgeError::AuthFailed("token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Build URL for a repository endpoint.
    fn repo_url(&self, repo: &Repository, path: &str) -> String {
        format!("{}/repos/{}/{}", self.api_base, repo.id, path)
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        response: Response,
    ) -> Result<T, ForgeError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            })
        } else {
            Err(Self::error_from_response(response, status).await)
        }
    }

    /// Map an error response from the API.
    async fn error_from_response(response: Response, status: StatusCode) -> ForgeError {
        // Classic tokens report the scopes an endpoint needs
        let required_scopes = response
            .headers()
            .get("X-Accepted-OAuth-Scopes")
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let message = match response.json::<GitHubErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => "Unknown error".to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("Invalid or expired token".into()),
            StatusCode::FORBIDDEN if message.to_lowercase().contains("rate limit") => {
                ForgeError::RateLimited
            }
            StatusCode::FORBIDDEN => {
                let mut err_msg = format!("Permission denied: {}", message);
                if let Some(scopes) = required_scopes {
                    err_msg.push_str(&format!(" [required scopes: {}]", scopes));
                }
                ForgeError::AuthFailed(err_msg)
            }
            StatusCode::NOT_FOUND => ForgeError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
            _ if status.is_server_error() => ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("GitHub server error: {}", message),
            },
            _ => ForgeError::ApiError {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl RemoteHandler for GitHubForge {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn list_candidates(&self, filter_tag: &str) -> Result<Vec<Repository>, ForgeError> {
        let url = format!("{}/user/repos", self.api_base);
        let mut repos = Vec::new();
        let mut page: u32 = 1;

        loop {
            let response = self
                .client
                .get(&url)
                .headers(self.headers()?)
                .query(&[
                    ("affiliation", "owner,collaborator,organization_member".to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ])
                .send()
                .await
                .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

            let items: Vec<GitHubRepo> = Self::handle_response(response).await?;
            let fetched = items.len();
            debug!(page, count = fetched, "fetched repository page");

            repos.extend(
                items
                    .into_iter()
                    .filter(|r| !r.archived && r.topics.iter().any(|t| t == filter_tag))
                    .filter_map(GitHubRepo::into_repository),
            );

            if fetched < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(repos)
    }

    async fn has_open_update_request(&self, repo: &Repository) -> Result<bool, ForgeError> {
        let url = self.repo_url(repo, "pulls");
        let mut page: u32 = 1;

        loop {
            let response = self
                .client
                .get(&url)
                .headers(self.headers()?)
                .query(&[
                    ("state", "open".to_string()),
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ])
                .send()
                .await
                .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

            let pulls: Vec<GitHubPullRequest> = Self::handle_response(response).await?;
            if pulls.iter().any(|pr| pr.title.contains(&self.request.title)) {
                return Ok(true);
            }
            if pulls.len() < PER_PAGE {
                return Ok(false);
            }
            page += 1;
        }
    }

    async fn open_update_request(
        &self,
        repo: &Repository,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<(), ForgeError> {
        let request = UpdateRequest::new(&self.request, source_branch, target_branch);
        debug!(
            remove_source_branch = request.remove_source_branch,
            squash = request.squash,
            "merge flags are repository settings on GitHub; not sent"
        );
        let body = CreatePrBody {
            head: &request.source_branch,
            base: &request.target_branch,
            title: &request.title,
        };

        let response = self
            .client
            .post(self.repo_url(repo, "pulls"))
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::CREATED => {
                if let Ok(pr) = response.json::<GitHubPullRequest>().await {
                    debug!(number = pr.number, url = ?pr.html_url, "pull request created");
                }
                Ok(())
            }
            _ if status.is_success() => Err(ForgeError::ApiError {
                status: status.as_u16(),
                message: "pull request was not created".to_string(),
            }),
            _ => Err(Self::error_from_response(response, status).await),
        }
    }
}

// --------------------------------------------------------------------------
// Wire types
// --------------------------------------------------------------------------

/// Request body for creating a PR.
#[derive(Debug, Serialize)]
struct CreatePrBody<'a> {
    head: &'a str,
    base: &'a str,
    title: &'a str,
}

/// GitHub error response format.
#[derive(Debug, Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

/// GitHub repository (subset).
#[derive(Debug, Deserialize)]
struct GitHubRepo {
    full_name: String,
    clone_url: String,
    default_branch: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    size: u64,
}

impl GitHubRepo {
    fn into_repository(self) -> Option<Repository> {
        // Empty repositories still report a default branch name
        if self.size == 0 {
            debug!(repo = %self.full_name, "skipping empty repository");
            return None;
        }
        let branch = self.default_branch?;
        match BranchName::new(branch) {
            Ok(default_branch) => Some(Repository {
                id: RepoId::new(self.full_name.clone()),
                name: self.full_name,
                url: self.clone_url,
                default_branch,
            }),
            Err(e) => {
                warn!(repo = %self.full_name, error = %e, "skipping repository");
                None
            }
        }
    }
}

/// GitHub pull request (subset).
#[derive(Debug, Deserialize)]
struct GitHubPullRequest {
    number: u64,
    title: String,
    html_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn forge() -> GitHubForge {
        GitHubForge::new(
            &ForgeSettings {
                url: "https://api.github.com/".into(),
                token: "ghp_secret".into(),
                timeout: Duration::from_secs(5),
            },
            RequestSettings {
                title: "[Upkeep] Dependency Update".into(),
                remove_source_branch: true,
                squash: false,
            },
        )
        .unwrap()
    }

    fn repository() -> Repository {
        Repository {
            id: RepoId::new("octocat/hello-world"),
            name: "octocat/hello-world".into(),
            url: "https://github.com/octocat/hello-world.git".into(),
            default_branch: BranchName::new("main").unwrap(),
        }
    }

    #[test]
    fn repo_url_uses_full_name() {
        let forge = forge();
        assert_eq!(forge.api_base(), "https://api.github.com");
        assert_eq!(
            forge.repo_url(&repository(), "pulls"),
            "https://api.github.com/repos/octocat/hello-world/pulls"
        );
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", forge());
        assert!(!debug.contains("ghp_secret"));
    }

    #[test]
    fn empty_repository_is_skipped() {
        let repo: GitHubRepo = serde_json::from_str(
            r#"{"full_name": "o/empty", "clone_url": "https://github.com/o/empty.git",
                "default_branch": "main", "topics": ["upkeep"], "size": 0}"#,
        )
        .unwrap();
        assert!(repo.into_repository().is_none());
    }

    #[test]
    fn repository_converts() {
        let repo: GitHubRepo = serde_json::from_str(
            r#"{"full_name": "o/svc", "clone_url": "https://github.com/o/svc.git",
                "default_branch": "develop", "topics": ["upkeep"], "size": 12}"#,
        )
        .unwrap();
        let repo = repo.into_repository().unwrap();
        assert_eq!(repo.id.as_str(), "o/svc");
        assert_eq!(repo.default_branch.as_str(), "develop");
    }
}
