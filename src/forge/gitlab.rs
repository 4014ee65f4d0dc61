//! forge::gitlab
//!
//! GitLab remote handler using the REST v4 API.
//!
//! # Endpoints
//!
//! - `GET  /projects?topic=<tag>&membership=true` - candidate discovery (paginated)
//! - `GET  /projects/:id/merge_requests?state=opened&in=title&search=<marker>` - idempotency check
//! - `POST /projects/:id/merge_requests` - open a merge request (`201 Created` only)
//!
//! # Authentication
//!
//! A personal, group or project access token sent as a bearer token.
//!
//! # Example
//!
//! ```ignore
//! use upkeep::forge::gitlab::GitLabForge;
//!
//! let forge = GitLabForge::new(&config.gitlab()?, config.request())?;
//! let repos = forge.list_candidates("upkeep").await?;
//! ```

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::traits::{ForgeError, RemoteHandler, UpdateRequest};
use crate::core::config::{ForgeSettings, RequestSettings};
use crate::core::types::{BranchName, RepoId, Repository};

/// User-Agent header value for API requests.
pub(crate) const USER_AGENT_VALUE: &str = concat!("upkeep/", env!("CARGO_PKG_VERSION"));

/// Page size for list endpoints (GitLab maximum).
const PER_PAGE: &str = "100";

/// GitLab remote handler.
pub struct GitLabForge {
    client: Client,
    /// Instance URL without the `/api/v4` suffix
    base_url: String,
    token: String,
    request: RequestSettings,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitLabForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabForge")
            .field("base_url", &self.base_url)
            .field("has_token", &!self.token.is_empty())
            .field("request", &self.request)
            .finish()
    }
}

impl GitLabForge {
    /// Create a GitLab handler.
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
            base_url: settings.url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            request,
        })
    }

    /// Instance URL this handler talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build URL for an API endpoint.
    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v4/{}", self.base_url, path)
    }

    fn headers(&self) -> Result<HeaderMap, ForgeError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| ForgeError::AuthFailed("token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        Ok(headers)
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
        // GitLab reports errors as {"message": ...} or {"error": ...};
        // message may be a string, a list or an object.
        let message = match response.json::<GitLabErrorResponse>().await {
            Ok(err) => err.into_message(),
            Err(_) => "Unknown error".to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("Invalid or expired token".into()),
            StatusCode::FORBIDDEN => ForgeError::AuthFailed(format!("Permission denied: {}", message)),
            StatusCode::NOT_FOUND => ForgeError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
            _ if status.is_server_error() => ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("GitLab server error: {}", message),
            },
            _ => ForgeError::ApiError {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl RemoteHandler for GitLabForge {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    async fn list_candidates(&self, filter_tag: &str) -> Result<Vec<Repository>, ForgeError> {
        let url = self.api_url("projects");
        let mut repos = Vec::new();
        let mut page: u32 = 1;

        loop {
            let page_param = page.to_string();
            let response = self
                .client
                .get(&url)
                .headers(self.headers()?)
                .query(&[
                    ("topic", filter_tag),
                    ("membership", "true"),
                    ("archived", "false"),
                    ("simple", "true"),
                    ("per_page", PER_PAGE),
                    ("page", page_param.as_str()),
                ])
                .send()
                .await
                .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u32>().ok());

            let projects: Vec<GitLabProject> = Self::handle_response(response).await?;
            debug!(page, count = projects.len(), "fetched project page");

            repos.extend(projects.into_iter().filter_map(GitLabProject::into_repository));

            match next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(repos)
    }

    async fn has_open_update_request(&self, repo: &Repository) -> Result<bool, ForgeError> {
        let url = self.api_url(&format!("projects/{}/merge_requests", repo.id));
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .query(&[
                ("state", "opened"),
                ("in", "title"),
                ("search", self.request.title.as_str()),
                ("per_page", PER_PAGE),
            ])
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        let open: Vec<GitLabMergeRequest> = Self::handle_response(response).await?;

        // search is a fuzzy match; confirm the marker client-side
        Ok(open.iter().any(|mr| mr.title.contains(&self.request.title)))
    }

    async fn open_update_request(
        &self,
        repo: &Repository,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<(), ForgeError> {
        let request = UpdateRequest::new(&self.request, source_branch, target_branch);
        let url = self.api_url(&format!("projects/{}/merge_requests", repo.id));
        let body = CreateMergeRequestBody::from(&request);

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::CREATED => {
                if let Ok(mr) = response.json::<GitLabMergeRequest>().await {
                    debug!(iid = mr.iid, url = ?mr.web_url, "merge request created");
                }
                Ok(())
            }
            _ if status.is_success() => Err(ForgeError::ApiError {
                status: status.as_u16(),
                message: "merge request was not created".to_string(),
            }),
            _ => Err(Self::error_from_response(response, status).await),
        }
    }
}

// --------------------------------------------------------------------------
// Wire types
// --------------------------------------------------------------------------

/// Request body for creating a merge request.
#[derive(Debug, Serialize)]
struct CreateMergeRequestBody<'a> {
    source_branch: &'a str,
    target_branch: &'a str,
    title: &'a str,
    remove_source_branch: bool,
    squash: bool,
}

impl<'a> From<&'a UpdateRequest> for CreateMergeRequestBody<'a> {
    fn from(request: &'a UpdateRequest) -> Self {
        Self {
            source_branch: &request.source_branch,
            target_branch: &request.target_branch,
            title: &request.title,
            remove_source_branch: request.remove_source_branch,
            squash: request.squash,
        }
    }
}

/// GitLab project (subset of the `simple` representation).
#[derive(Debug, Deserialize)]
struct GitLabProject {
    id: u64,
    path_with_namespace: String,
    http_url_to_repo: String,
    default_branch: Option<String>,
}

impl GitLabProject {
    /// Convert to a repository, skipping projects without a usable default branch.
    fn into_repository(self) -> Option<Repository> {
        let Some(branch) = self.default_branch else {
            debug!(project = %self.path_with_namespace, "skipping empty project");
            return None;
        };
        match BranchName::new(branch) {
            Ok(default_branch) => Some(Repository {
                id: RepoId::new(self.id.to_string()),
                name: self.path_with_namespace,
                url: self.http_url_to_repo,
                default_branch,
            }),
            Err(e) => {
                warn!(project = %self.path_with_namespace, error = %e, "skipping project");
                None
            }
        }
    }
}

/// GitLab merge request (subset).
#[derive(Debug, Deserialize)]
struct GitLabMergeRequest {
    iid: u64,
    title: String,
    web_url: Option<String>,
}

/// GitLab error response format.
#[derive(Debug, Deserialize)]
struct GitLabErrorResponse {
    message: Option<serde_json::Value>,
    error: Option<String>,
}

impl GitLabErrorResponse {
    fn into_message(self) -> String {
        match (self.message, self.error) {
            (Some(serde_json::Value::String(s)), _) => s,
            (Some(serde_json::Value::Array(items)), _) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join("; "),
            (Some(other), _) => other.to_string(),
            (None, Some(error)) => error,
            (None, None) => "Unknown error".to_string(),
        }
    }
}
