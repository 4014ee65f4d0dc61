//! forge::mock
//!
//! Mock remote handler for deterministic testing.
//!
//! # Design
//!
//! Repositories (with their tags) and open update requests live in memory.
//! Every call is recorded so tests can assert on exactly what the pipeline
//! asked of the remote, and a single operation can be configured to fail.
//!
//! # Example
//!
//! ```
//! use upkeep::core::types::{BranchName, RepoId, Repository};
//! use upkeep::forge::mock::MockForge;
//! use upkeep::forge::RemoteHandler;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let repo = Repository {
//!     id: RepoId::new("1"),
//!     name: "group/service".into(),
//!     url: "https://gitlab.example.com/group/service.git".into(),
//!     default_branch: BranchName::new("main").unwrap(),
//! };
//! let forge = MockForge::new().with_repo(repo.clone(), &["upkeep"]);
//!
//! assert_eq!(forge.list_candidates("upkeep").await.unwrap().len(), 1);
//! assert!(!forge.has_open_update_request(&repo).await.unwrap());
//!
//! forge.open_update_request(&repo, "upkeep/dependency-update", "main").await.unwrap();
//! assert!(forge.has_open_update_request(&repo).await.unwrap());
//! # });
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::traits::{ForgeError, RemoteHandler, UpdateRequest};
use crate::core::config::RequestSettings;
use crate::core::types::{RepoId, Repository};

/// Default marker title used by the mock.
const MOCK_TITLE: &str = "[Upkeep] Dependency Update";

/// Mock remote handler for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MockForge {
    inner: Arc<Mutex<MockForgeInner>>,
}

#[derive(Debug)]
struct MockForgeInner {
    request: RequestSettings,
    /// Repositories and their tags, in insertion order.
    repos: Vec<(Repository, Vec<String>)>,
    /// Open update requests per repository.
    open: HashMap<RepoId, Vec<UpdateRequest>>,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail list_candidates with the given error.
    ListCandidates(ForgeError),
    /// Fail has_open_update_request with the given error.
    HasOpenRequest(ForgeError),
    /// Fail open_update_request with the given error.
    OpenRequest(ForgeError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    ListCandidates {
        filter_tag: String,
    },
    HasOpenRequest {
        repo: RepoId,
    },
    OpenRequest {
        repo: RepoId,
        request: UpdateRequest,
    },
}

impl MockForge {
    /// Create an empty mock with the default request settings.
    pub fn new() -> Self {
        Self::with_request_settings(RequestSettings {
            title: MOCK_TITLE.to_string(),
            remove_source_branch: true,
            squash: false,
        })
    }

    /// Create an empty mock using the given request settings.
    pub fn with_request_settings(request: RequestSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockForgeInner {
                request,
                repos: Vec::new(),
                open: HashMap::new(),
                fail_on: None,
                operations: Vec::new(),
            })),
        }
    }

    /// Add a repository carrying the given tags.
    pub fn with_repo(self, repo: Repository, tags: &[&str]) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .repos
                .push((repo, tags.iter().map(|t| t.to_string()).collect()));
        }
        self
    }

    /// Seed an open request carrying `title` (not necessarily the marker).
    pub fn with_open_request(self, repo: &RepoId, title: &str) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let request = UpdateRequest {
                source_branch: "feature".into(),
                target_branch: "main".into(),
                title: title.to_string(),
                remove_source_branch: false,
                squash: false,
            };
            inner.open.entry(repo.clone()).or_default().push(request);
        }
        self
    }

    /// Configure the mock to fail on a specific operation.
    ///
    /// # Example
    ///
    /// ```
    /// use upkeep::forge::mock::{FailOn, MockForge};
    /// use upkeep::forge::ForgeError;
    ///
    /// let forge = MockForge::new().fail_on(FailOn::OpenRequest(ForgeError::RateLimited));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.fail_on = Some(fail_on);
        }
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_on = None;
    }

    /// Close (merge) every open request for a repository.
    pub fn close_requests(&self, repo: &RepoId) {
        let mut inner = self.inner.lock().unwrap();
        inner.open.remove(repo);
    }

    /// Open requests for a repository (for test verification).
    pub fn open_requests(&self, repo: &RepoId) -> Vec<UpdateRequest> {
        let inner = self.inner.lock().unwrap();
        inner.open.get(repo).cloned().unwrap_or_default()
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        let inner = self.inner.lock().unwrap();
        inner.operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.operations.clear();
    }

    fn record(&self, op: MockOperation) {
        let mut inner = self.inner.lock().unwrap();
        inner.operations.push(op);
    }

    /// Check if we should fail and return the error if so.
    fn check_fail(&self, expected: &str) -> Result<(), ForgeError> {
        let inner = self.inner.lock().unwrap();
        match &inner.fail_on {
            Some(FailOn::ListCandidates(e)) if expected == "list_candidates" => Err(e.clone()),
            Some(FailOn::HasOpenRequest(e)) if expected == "has_open_update_request" => {
                Err(e.clone())
            }
            Some(FailOn::OpenRequest(e)) if expected == "open_update_request" => Err(e.clone()),
            _ => Ok(()),
        }
    }
}

impl Default for MockForge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteHandler for MockForge {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn list_candidates(&self, filter_tag: &str) -> Result<Vec<Repository>, ForgeError> {
        self.record(MockOperation::ListCandidates {
            filter_tag: filter_tag.to_string(),
        });
        self.check_fail("list_candidates")?;

        let inner = self.inner.lock().unwrap();
        Ok(inner
            .repos
            .iter()
            .filter(|(_, tags)| tags.iter().any(|t| t == filter_tag))
            .map(|(repo, _)| repo.clone())
            .collect())
    }

    async fn has_open_update_request(&self, repo: &Repository) -> Result<bool, ForgeError> {
        self.record(MockOperation::HasOpenRequest {
            repo: repo.id.clone(),
        });
        self.check_fail("has_open_update_request")?;

        let inner = self.inner.lock().unwrap();
        let marker = &inner.request.title;
        Ok(inner
            .open
            .get(&repo.id)
            .is_some_and(|requests| requests.iter().any(|r| r.title.contains(marker.as_str()))))
    }

    async fn open_update_request(
        &self,
        repo: &Repository,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<(), ForgeError> {
        let request = {
            let inner = self.inner.lock().unwrap();
            UpdateRequest::new(&inner.request, source_branch, target_branch)
        };
        self.record(MockOperation::OpenRequest {
            repo: repo.id.clone(),
            request: request.clone(),
        });
        self.check_fail("open_update_request")?;

        let mut inner = self.inner.lock().unwrap();
        if !inner.repos.iter().any(|(r, _)| r.id == repo.id) {
            return Err(ForgeError::NotFound(format!("repository {}", repo.id)));
        }
        inner.open.entry(repo.id.clone()).or_default().push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BranchName;

    fn repo(id: &str) -> Repository {
        Repository {
            id: RepoId::new(id),
            name: format!("group/{id}"),
            url: format!("file:///repos/{id}.git"),
            default_branch: BranchName::new("main").unwrap(),
        }
    }

    #[tokio::test]
    async fn list_candidates_filters_by_tag() {
        let forge = MockForge::new()
            .with_repo(repo("a"), &["upkeep", "go"])
            .with_repo(repo("b"), &["other"])
            .with_repo(repo("c"), &["upkeep"]);

        let names: Vec<_> = forge
            .list_candidates("upkeep")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(names, vec![RepoId::new("a"), RepoId::new("c")]);
    }

    #[tokio::test]
    async fn open_request_with_other_title_is_ignored() {
        let r = repo("a");
        let forge = MockForge::new()
            .with_repo(r.clone(), &["upkeep"])
            .with_open_request(&r.id, "Add feature");
        assert!(!forge.has_open_update_request(&r).await.unwrap());
    }

    #[tokio::test]
    async fn open_then_close() {
        let r = repo("a");
        let forge = MockForge::new().with_repo(r.clone(), &["upkeep"]);

        forge
            .open_update_request(&r, "upkeep/dependency-update", "main")
            .await
            .unwrap();
        assert!(forge.has_open_update_request(&r).await.unwrap());

        let open = forge.open_requests(&r.id);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].title, MOCK_TITLE);
        assert!(open[0].remove_source_branch);

        forge.close_requests(&r.id);
        assert!(!forge.has_open_update_request(&r).await.unwrap());
    }

    #[tokio::test]
    async fn open_request_for_unknown_repo_fails() {
        let forge = MockForge::new();
        let result = forge.open_update_request(&repo("x"), "b", "main").await;
        assert!(matches!(result, Err(ForgeError::NotFound(_))));
    }

    #[tokio::test]
    async fn fail_on_is_scoped_to_one_operation() {
        let r = repo("a");
        let forge = MockForge::new()
            .with_repo(r.clone(), &["upkeep"])
            .fail_on(FailOn::OpenRequest(ForgeError::RateLimited));

        assert!(forge.has_open_update_request(&r).await.is_ok());
        assert!(matches!(
            forge.open_update_request(&r, "b", "main").await,
            Err(ForgeError::RateLimited)
        ));

        forge.clear_fail_on();
        assert!(forge.open_update_request(&r, "b", "main").await.is_ok());
    }

    #[tokio::test]
    async fn operations_recorded() {
        let r = repo("a");
        let forge = MockForge::new().with_repo(r.clone(), &["upkeep"]);
        forge.list_candidates("upkeep").await.unwrap();
        forge.has_open_update_request(&r).await.unwrap();

        assert_eq!(
            forge.operations(),
            vec![
                MockOperation::ListCandidates {
                    filter_tag: "upkeep".into()
                },
                MockOperation::HasOpenRequest { repo: r.id.clone() },
            ]
        );

        forge.clear_operations();
        assert!(forge.operations().is_empty());
    }

    #[test]
    fn forge_name() {
        assert_eq!(MockForge::new().name(), "mock");
    }
}
