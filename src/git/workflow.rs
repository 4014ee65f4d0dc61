//! git::workflow
//!
//! Ephemeral working copy driven through a fixed sequence of states.
//!
//! # States
//!
//! ```text
//! Uninitialized -> Cloned -> Branched -> FileLoaded -> FileMutated -> Committed -> Pushed
//!                                           |                            ^
//!                                           +----------------------------+
//! ```
//!
//! Any error, including calling an operation from the wrong state, moves
//! the workflow to `Failed`, which accepts nothing. The working copy is a
//! private temporary directory removed when the workflow is dropped.
//!
//! All operations block on I/O. Async callers run them on the blocking
//! pool.

use std::cell::RefCell;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Cred, FetchOptions, PushOptions, RemoteCallbacks, Signature};
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

use crate::core::config::{AuthorIdentity, Credentials};
use crate::core::types::{BranchName, Oid, Repository, TypeError};

/// Errors from git workflow operations.
#[derive(Debug, Clone, Error)]
pub enum GitError {
    /// Operation called from a state that does not allow it.
    #[error("cannot {operation} in state {state}")]
    InvalidTransition {
        operation: &'static str,
        state: WorkflowState,
    },

    /// Cloning the remote repository failed.
    #[error("clone of {url} failed: {message}")]
    CloneFailed { url: String, message: String },

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound { refname: String },

    /// Invalid ref name.
    #[error("invalid ref name: {message}")]
    InvalidRefName { message: String },

    /// File absent from the working copy.
    #[error("file not found in working copy: {path}")]
    FileNotFound { path: String },

    /// Path escapes the working copy.
    #[error("invalid working copy path: {path}")]
    InvalidPath { path: String },

    /// The commit would not change the tree.
    #[error("nothing to commit")]
    NothingToCommit,

    /// The remote rejected or failed the push.
    #[error("push of {refname} failed: {message}")]
    PushFailed { refname: String, message: String },

    /// Permission or filesystem error.
    #[error("working copy access error: {message}")]
    AccessError { message: String },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal { message: String },
}

impl GitError {
    /// Create a GitError from a git2::Error with context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::RefNotFound {
                refname: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::Internal {
            message: err.message().to_string(),
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidBranchName(msg) => GitError::InvalidRefName { message: msg },
            TypeError::InvalidOid(msg) => GitError::Internal { message: msg },
        }
    }
}

/// Lifecycle state of a [`GitWorkflow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Uninitialized,
    Cloned,
    Branched,
    FileLoaded,
    FileMutated,
    Committed,
    Pushed,
    Failed,
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowState::Uninitialized => "uninitialized",
            WorkflowState::Cloned => "cloned",
            WorkflowState::Branched => "branched",
            WorkflowState::FileLoaded => "file-loaded",
            WorkflowState::FileMutated => "file-mutated",
            WorkflowState::Committed => "committed",
            WorkflowState::Pushed => "pushed",
            WorkflowState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// One isolated working copy for one repository run.
pub struct GitWorkflow {
    credentials: Credentials,
    state: WorkflowState,
    // Field order matters: the repository handle closes before its directory is removed.
    repo: Option<git2::Repository>,
    dir: Option<TempDir>,
    url: Option<String>,
    default_branch: Option<BranchName>,
    branch: Option<BranchName>,
    head: Option<Oid>,
}

impl std::fmt::Debug for GitWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitWorkflow")
            .field("state", &self.state)
            .field("path", &self.path())
            .field("branch", &self.branch)
            .field("head", &self.head)
            .finish()
    }
}

impl GitWorkflow {
    /// Create a workflow that authenticates with `credentials`.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: WorkflowState::Uninitialized,
            repo: None,
            dir: None,
            url: None,
            default_branch: None,
            branch: None,
            head: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Root of the working copy, once cloned.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// The update branch, once created.
    pub fn branch(&self) -> Option<&BranchName> {
        self.branch.as_ref()
    }

    /// The commit created by [`commit`](Self::commit).
    pub fn head(&self) -> Option<&Oid> {
        self.head.as_ref()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Clone `repository` into a fresh temporary directory.
    pub fn clone(&mut self, repository: &Repository) -> Result<(), GitError> {
        self.guard("clone", &[WorkflowState::Uninitialized])?;
        let result = self.do_clone(repository);
        self.finish(result, WorkflowState::Cloned)
    }

    /// Create `branch` at the head of the default branch and check it out.
    pub fn branch_from_default(&mut self, branch: &BranchName) -> Result<(), GitError> {
        self.guard("branch", &[WorkflowState::Cloned])?;
        let result = self.do_branch(branch);
        self.finish(result, WorkflowState::Branched)
    }

    /// Whether `name` exists in the working copy. Does not change state.
    pub fn has_file(&mut self, name: &str) -> Result<bool, GitError> {
        self.guard(
            "inspect files",
            &[WorkflowState::Branched, WorkflowState::FileLoaded],
        )?;
        let result = self.resolve(name).map(|path| path.is_file());
        let state = self.state;
        self.finish(result, state)
    }

    /// Read `name` from the working copy.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>, GitError> {
        self.guard(
            "read file",
            &[WorkflowState::Branched, WorkflowState::FileLoaded],
        )?;
        let result = self.resolve(name).and_then(|path| {
            fs::read(&path).map_err(|e| match e.kind() {
                ErrorKind::NotFound => GitError::FileNotFound {
                    path: name.to_string(),
                },
                _ => GitError::AccessError {
                    message: format!("{}: {}", name, e),
                },
            })
        });
        self.finish(result, WorkflowState::FileLoaded)
    }

    /// Overwrite `name` in the working copy without committing.
    pub fn write_file(&mut self, name: &str, contents: &[u8]) -> Result<(), GitError> {
        self.guard(
            "write file",
            &[WorkflowState::FileLoaded, WorkflowState::FileMutated],
        )?;
        let result = self.resolve(name).and_then(|path| write(&path, name, contents));
        self.finish(result, WorkflowState::FileMutated)
    }

    /// Write `name`, stage it and commit on the update branch.
    ///
    /// # Errors
    ///
    /// `NothingToCommit` if the resulting tree equals the parent's tree.
    pub fn commit(
        &mut self,
        name: &str,
        contents: &[u8],
        author: &AuthorIdentity,
        message: &str,
    ) -> Result<Oid, GitError> {
        self.guard(
            "commit",
            &[WorkflowState::FileLoaded, WorkflowState::FileMutated],
        )?;
        let result = self.do_commit(name, contents, author, message);
        if let Ok(oid) = &result {
            self.head = Some(oid.clone());
        }
        self.finish(result, WorkflowState::Committed)
    }

    /// Force-push the update branch to `origin`.
    pub fn push(&mut self) -> Result<(), GitError> {
        self.guard("push", &[WorkflowState::Committed])?;
        let result = self.do_push();
        self.finish(result, WorkflowState::Pushed)
    }

    // =========================================================================
    // State handling
    // =========================================================================

    fn guard(&mut self, operation: &'static str, allowed: &[WorkflowState]) -> Result<(), GitError> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        let err = GitError::InvalidTransition {
            operation,
            state: self.state,
        };
        self.state = WorkflowState::Failed;
        Err(err)
    }

    fn finish<T>(&mut self, result: Result<T, GitError>, next: WorkflowState) -> Result<T, GitError> {
        self.state = match result {
            Ok(_) => next,
            Err(_) => WorkflowState::Failed,
        };
        result
    }

    fn repo(&self) -> Result<&git2::Repository, GitError> {
        self.repo.as_ref().ok_or_else(not_initialized)
    }

    fn require_branch(&self) -> Result<&BranchName, GitError> {
        self.branch.as_ref().ok_or_else(|| GitError::Internal {
            message: "update branch not created".to_string(),
        })
    }

    /// Resolve a relative path inside the working copy.
    fn resolve(&self, name: &str) -> Result<PathBuf, GitError> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(GitError::InvalidPath {
                path: name.to_string(),
            });
        }
        let root = self.path().ok_or_else(not_initialized)?;
        Ok(root.join(relative))
    }

    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let mut attempted = false;
        callbacks.credentials(move |_url, username_from_url, _allowed| {
            // libgit2 calls again after a rejected credential; give up instead of looping
            if attempted {
                return Err(git2::Error::from_str("credentials rejected"));
            }
            attempted = true;
            let username = if self.credentials.username.is_empty() {
                username_from_url.unwrap_or("git")
            } else {
                self.credentials.username.as_str()
            };
            Cred::userpass_plaintext(username, &self.credentials.password)
        });
        callbacks
    }

    // =========================================================================
    // Operations
    // =========================================================================

    fn do_clone(&mut self, repository: &Repository) -> Result<(), GitError> {
        let dir = tempfile::Builder::new()
            .prefix("upkeep-")
            .tempdir()
            .map_err(|e| GitError::AccessError {
                message: format!("cannot create working copy: {}", e),
            })?;

        debug!(url = %repository.url, path = %dir.path().display(), "cloning");

        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(self.callbacks());

        let repo = RepoBuilder::new()
            .fetch_options(fetch)
            .branch(repository.default_branch.as_str())
            .clone(&repository.url, dir.path())
            .map_err(|e| GitError::CloneFailed {
                url: repository.url.clone(),
                message: e.message().to_string(),
            })?;

        self.repo = Some(repo);
        self.dir = Some(dir);
        self.url = Some(repository.url.clone());
        self.default_branch = Some(repository.default_branch.clone());
        Ok(())
    }

    fn do_branch(&mut self, branch: &BranchName) -> Result<(), GitError> {
        let default = self.default_branch.clone().ok_or_else(not_initialized)?;
        if branch == &default {
            return Err(GitError::InvalidRefName {
                message: format!("update branch must differ from default branch '{}'", default),
            });
        }

        let repo = self.repo.as_ref().ok_or_else(not_initialized)?;
        let remote_ref = format!("refs/remotes/origin/{}", default);
        let reference = repo
            .find_reference(&remote_ref)
            .or_else(|_| repo.find_reference(&default.local_ref()))
            .map_err(|e| GitError::from_git2(e, &remote_ref))?;
        let commit = reference
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, &remote_ref))?;

        repo.branch(branch.as_str(), &commit, true)
            .map_err(|e| GitError::from_git2(e, &branch.local_ref()))?;
        repo.set_head(&branch.local_ref())?;
        repo.checkout_head(Some(CheckoutBuilder::new().force()))?;

        debug!(branch = %branch, base = %commit.id(), "created update branch");
        self.branch = Some(branch.clone());
        Ok(())
    }

    fn do_commit(
        &self,
        name: &str,
        contents: &[u8],
        author: &AuthorIdentity,
        message: &str,
    ) -> Result<Oid, GitError> {
        let path = self.resolve(name)?;
        write(&path, name, contents)?;

        let repo = self.repo()?;
        let branch = self.require_branch()?;

        let mut index = repo.index()?;
        index.add_path(Path::new(name))?;
        index.write()?;
        let tree_id = index.write_tree()?;

        let parent = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| GitError::from_git2(e, "HEAD"))?;
        if parent.tree_id() == tree_id {
            return Err(GitError::NothingToCommit);
        }

        let tree = repo.find_tree(tree_id)?;
        let signature = Signature::now(&author.name, &author.email)?;
        let oid = repo.commit(
            Some(&branch.local_ref()),
            &signature,
            &signature,
            message,
            &tree,
            &[&parent],
        )?;

        debug!(commit = %oid, "committed manifest update");
        Ok(Oid::new(oid.to_string())?)
    }

    fn do_push(&self) -> Result<(), GitError> {
        let repo = self.repo()?;
        let refname = self.require_branch()?.local_ref();
        let refspec = format!("+{0}:{0}", refname);

        let rejection: RefCell<Option<String>> = RefCell::new(None);
        {
            let mut callbacks = self.callbacks();
            callbacks.push_update_reference(|reference, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some(format!("{}: {}", reference, message));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            let mut remote = repo.find_remote("origin")?;
            remote
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(|e| GitError::PushFailed {
                    refname: refname.clone(),
                    message: e.message().to_string(),
                })?;
        }

        if let Some(message) = rejection.into_inner() {
            return Err(GitError::PushFailed { refname, message });
        }
        debug!(refname = %refname, url = ?self.url, "pushed update branch");
        Ok(())
    }
}

fn not_initialized() -> GitError {
    GitError::Internal {
        message: "working copy not initialized".to_string(),
    }
}

fn write(path: &Path, name: &str, contents: &[u8]) -> Result<(), GitError> {
    fs::write(path, contents).map_err(|e| GitError::AccessError {
        message: format!("{}: {}", name, e),
    })
}
