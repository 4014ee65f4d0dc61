//! engine::pipeline
//!
//! The update pipeline for a single repository.
//!
//! # Steps
//!
//! ```text
//! CheckPending -> Clone -> Branch -> DetectManifest -> ReadManifest -> Parse
//!   -> Decide -> Mutate -> Serialize -> Commit -> Push -> OpenRequest
//! ```
//!
//! The run stops early with [`RunOutcome::AlreadyPending`] (before any
//! clone), [`RunOutcome::NoManifest`] or [`RunOutcome::UpToDate`]. Every
//! failure is returned as a [`PipelineError`] naming the step; nothing
//! escapes the run.
//!
//! # Invariants
//!
//! - An open update request means no git operation happens at all
//! - Nothing is pushed unless every decided update was applied, or
//!   `strict_apply` is off and the missing ones were reported
//! - The working copy is removed when the run ends, successful or not

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::core::config::GitSettings;
use crate::core::types::{Oid, PlannedUpdate, Repository};
use crate::forge::{ForgeError, RemoteHandler};
use crate::git::{GitError, GitWorkflow};
use crate::manifest::{ManagerKind, ManifestError};
use crate::policy::UpdatePolicy;
use crate::registry::{LookupError, VersionSource};

/// Pipeline step, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CheckPending,
    Clone,
    Branch,
    DetectManifest,
    ReadManifest,
    Parse,
    Decide,
    Mutate,
    Serialize,
    Commit,
    Push,
    OpenRequest,
    /// The run exceeded its deadline.
    Timeout,
    /// The run panicked.
    Panic,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::CheckPending => "check-pending",
            Step::Clone => "clone",
            Step::Branch => "branch",
            Step::DetectManifest => "detect-manifest",
            Step::ReadManifest => "read-manifest",
            Step::Parse => "parse",
            Step::Decide => "decide",
            Step::Mutate => "mutate",
            Step::Serialize => "serialize",
            Step::Commit => "commit",
            Step::Push => "push",
            Step::OpenRequest => "open-request",
            Step::Timeout => "timeout",
            Step::Panic => "panic",
        };
        write!(f, "{}", name)
    }
}

/// Underlying cause of a failed step.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// The run was cut short (deadline, panic, runtime shutdown).
    #[error("{0}")]
    Aborted(String),
}

/// A failed repository run.
#[derive(Debug, Clone, Error)]
#[error("{step} failed: {source}")]
pub struct PipelineError {
    pub step: Step,
    #[source]
    pub source: StepError,
}

impl PipelineError {
    pub fn new(step: Step, source: impl Into<StepError>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }

    pub(crate) fn aborted(step: Step, message: impl Into<String>) -> Self {
        Self::new(step, StepError::Aborted(message.into()))
    }
}

/// Successful end of a repository run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// An update request is already open; nothing was done.
    AlreadyPending,
    /// No enabled manager's manifest exists in the repository.
    NoManifest,
    /// Every dependency is current (or nothing could be applied).
    UpToDate,
    /// Updates were committed, pushed and proposed.
    Updated {
        updates: Vec<PlannedUpdate>,
        /// Decided dependencies missing from the manifest at apply time
        not_found: Vec<String>,
        commit: Oid,
    },
}

/// Commit message for a set of applied updates.
///
/// ```
/// use semver::Version;
/// use upkeep::core::types::PlannedUpdate;
/// use upkeep::engine::commit_message;
///
/// let updates = vec![PlannedUpdate {
///     name: "golang.org/x/mod".into(),
///     from: Version::new(0, 14, 0),
///     to: Version::new(0, 17, 0),
/// }];
/// assert_eq!(
///     commit_message("[Upkeep]", &updates),
///     "[Upkeep] Update dependencies\n\n- golang.org/x/mod v0.14.0 -> v0.17.0\n"
/// );
/// ```
pub fn commit_message(prefix: &str, updates: &[PlannedUpdate]) -> String {
    let prefix = prefix.trim();
    let mut message = if prefix.is_empty() {
        "Update dependencies\n\n".to_string()
    } else {
        format!("{} Update dependencies\n\n", prefix)
    };
    for update in updates {
        message.push_str(&format!("- {}\n", update));
    }
    message
}

/// Per-repository update pipeline.
///
/// Shared read-only by every concurrent run of a batch.
pub struct Pipeline {
    remote: Arc<dyn RemoteHandler>,
    policy: Arc<dyn UpdatePolicy>,
    source: Arc<dyn VersionSource>,
    managers: Vec<ManagerKind>,
    git: GitSettings,
    strict_apply: bool,
}

impl Pipeline {
    pub fn new(
        remote: Arc<dyn RemoteHandler>,
        policy: Arc<dyn UpdatePolicy>,
        source: Arc<dyn VersionSource>,
        managers: Vec<ManagerKind>,
        git: GitSettings,
    ) -> Self {
        Self {
            remote,
            policy,
            source,
            managers,
            git,
            strict_apply: false,
        }
    }

    /// Fail the run when a decided dependency is missing at apply time.
    pub fn strict_apply(mut self, strict: bool) -> Self {
        self.strict_apply = strict;
        self
    }

    /// Run the pipeline for one repository.
    pub async fn run(&self, repo: &Repository) -> Result<RunOutcome, PipelineError> {
        let span = info_span!("repo", repo = %repo.name);
        async {
            let result = self.run_inner(repo).await;
            match &result {
                Ok(outcome) => debug!(?outcome, "run finished"),
                Err(e) => warn!(step = %e.step, error = %e.source, "run failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_inner(&self, repo: &Repository) -> Result<RunOutcome, PipelineError> {
        let pending = self
            .remote
            .has_open_update_request(repo)
            .await
            .map_err(|e| PipelineError::new(Step::CheckPending, e))?;
        if pending {
            info!("update request already open; skipping");
            return Ok(RunOutcome::AlreadyPending);
        }

        let wf = GitWorkflow::new(self.git.credentials.clone());

        let repository = repo.clone();
        let (wf, ()) = on_blocking_pool(wf, Step::Clone, move |wf| wf.clone(&repository)).await?;

        let branch = self.git.branch.clone();
        let (wf, ()) =
            on_blocking_pool(wf, Step::Branch, move |wf| wf.branch_from_default(&branch)).await?;

        let candidates: Vec<&'static str> =
            self.managers.iter().map(|k| k.manifest_file_name()).collect();
        let (wf, found) = on_blocking_pool(wf, Step::DetectManifest, move |wf| {
            for (index, name) in candidates.iter().enumerate() {
                if wf.has_file(name)? {
                    return Ok(Some(index));
                }
            }
            Ok(None)
        })
        .await?;
        let Some(kind) = found.map(|index| self.managers[index]) else {
            info!("no supported manifest found; skipping");
            return Ok(RunOutcome::NoManifest);
        };

        let file_name = kind.manifest_file_name();
        let (wf, contents) =
            on_blocking_pool(wf, Step::ReadManifest, move |wf| wf.read_file(file_name)).await?;

        let mut manager = kind.create(Arc::clone(&self.source));
        let deps = manager
            .parse(&contents)
            .map_err(|e| PipelineError::new(Step::Parse, e))?;
        debug!(manager = %kind, dependencies = deps.len(), "parsed manifest");

        let decision = self
            .policy
            .decide(&deps, manager.as_ref())
            .await
            .map_err(|e| PipelineError::new(Step::Decide, e))?;
        if decision.is_empty() {
            info!("dependencies up to date");
            return Ok(RunOutcome::UpToDate);
        }
        debug!(updates = decision.len(), policy = self.policy.name(), "decided updates");

        let mut applied = Vec::with_capacity(decision.len());
        let mut not_found = Vec::new();
        for update in decision.into_vec() {
            match manager.mutate(&update.target()) {
                Ok(()) => applied.push(update),
                Err(ManifestError::NotFound(name)) if !self.strict_apply => {
                    warn!(dependency = %name, "decided dependency missing from manifest");
                    not_found.push(name);
                }
                Err(e) => return Err(PipelineError::new(Step::Mutate, e)),
            }
        }
        if applied.is_empty() {
            warn!(missing = not_found.len(), "no decided update could be applied");
            return Ok(RunOutcome::UpToDate);
        }

        let updated = manager
            .serialize()
            .map_err(|e| PipelineError::new(Step::Serialize, e))?;

        let message = commit_message(&self.git.commit_prefix, &applied);
        let author = self.git.author.clone();
        let (wf, commit) = on_blocking_pool(wf, Step::Commit, move |wf| {
            wf.commit(file_name, &updated, &author, &message)
        })
        .await?;

        let (wf, ()) = on_blocking_pool(wf, Step::Push, |wf| wf.push()).await?;
        drop(wf);

        self.remote
            .open_update_request(repo, self.git.branch.as_str(), repo.default_branch.as_str())
            .await
            .map_err(|e| PipelineError::new(Step::OpenRequest, e))?;

        info!(updates = applied.len(), commit = %commit.short(8), "opened update request");
        Ok(RunOutcome::Updated {
            updates: applied,
            not_found,
            commit,
        })
    }
}

/// Run a git operation on the blocking pool, moving the workflow in and out.
async fn on_blocking_pool<T, F>(
    mut wf: GitWorkflow,
    step: Step,
    op: F,
) -> Result<(GitWorkflow, T), PipelineError>
where
    F: FnOnce(&mut GitWorkflow) -> Result<T, GitError> + Send + 'static,
    T: Send + 'static,
{
    let (wf, result) = tokio::task::spawn_blocking(move || {
        let result = op(&mut wf);
        (wf, result)
    })
    .await
    .map_err(|e| PipelineError::aborted(step, format!("git task failed: {}", e)))?;

    match result {
        Ok(value) => Ok((wf, value)),
        Err(e) => Err(PipelineError::new(step, e)),
    }
}
