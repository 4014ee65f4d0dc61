//! engine::orchestrator
//!
//! Batches of pipeline runs: list candidates, run each one concurrently
//! under a bound and a deadline, report.
//!
//! A panicking or timed-out run is recorded as a failed entry; it never
//! takes the batch or the service down with it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::pipeline::{Pipeline, PipelineError, Step};
use super::report::{BatchReport, RepoReport};
use crate::core::config::{Config, ConfigError, SchedulerSettings};
use crate::core::types::Repository;
use crate::forge::{create_remote, RemoteHandler};
use crate::manifest::resolve_managers;
use crate::policy::create_policy;
use crate::registry::DepsDevClient;

/// Drives batches of repository runs.
pub struct Orchestrator {
    remote: Arc<dyn RemoteHandler>,
    pipeline: Arc<Pipeline>,
    settings: SchedulerSettings,
    trigger: Arc<Notify>,
}

impl Orchestrator {
    pub fn new(
        remote: Arc<dyn RemoteHandler>,
        pipeline: Pipeline,
        settings: SchedulerSettings,
    ) -> Self {
        let pipeline = pipeline.strict_apply(settings.strict_apply);
        Self {
            remote,
            pipeline: Arc::new(pipeline),
            settings,
            trigger: Arc::new(Notify::new()),
        }
    }

    /// Wire every component from configuration.
    ///
    /// # Errors
    ///
    /// Any unknown component name, missing section or unresolved secret.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let remote = create_remote(config)?;
        let policy = create_policy(config.configured_policy())?;
        let source = DepsDevClient::new(&config.registry())
            .map_err(|e| ConfigError::InvalidValue(format!("registry: {}", e)))?;
        let managers = resolve_managers(&config.manager_names())?;
        let git = config.git()?;

        let pipeline = Pipeline::new(
            Arc::clone(&remote),
            policy,
            Arc::new(source),
            managers,
            git,
        );
        Ok(Self::new(remote, pipeline, config.scheduler()))
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Request an immediate batch from a running [`Orchestrator::run`] loop.
    ///
    /// A trigger that arrives while a batch is running starts one more
    /// batch after it; repeated triggers coalesce.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Handle for triggering from another task.
    pub fn trigger_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.trigger)
    }

    /// Process every candidate repository once.
    pub async fn run_batch(&self) -> BatchReport {
        let mut report = BatchReport::start();
        let span = info_span!("batch", id = %report.batch_id);

        async {
            let repos = match self.remote.list_candidates(&self.settings.filter_tag).await {
                Ok(repos) => repos,
                Err(e) => {
                    error!(error = %e, "listing candidate repositories failed");
                    report.listing_error = Some(e.to_string());
                    return;
                }
            };
            info!(
                candidates = repos.len(),
                tag = %self.settings.filter_tag,
                "starting batch"
            );

            let limit = Arc::new(Semaphore::new(self.settings.max_concurrent.max(1)));
            let mut tasks = JoinSet::new();
            for repo in repos {
                let limit = Arc::clone(&limit);
                let pipeline = Arc::clone(&self.pipeline);
                let deadline = self.settings.repo_timeout;
                tasks.spawn(
                    async move {
                        let _permit = limit.acquire_owned().await.ok();
                        let outcome = run_guarded(pipeline, repo.clone(), deadline).await;
                        RepoReport::new(repo.name, outcome)
                    }
                    .in_current_span(),
                );
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(entry) => report.entries.push(entry),
                    // run_guarded absorbs panics; this only fires on runtime shutdown
                    Err(e) => error!(error = %e, "batch task failed"),
                }
            }
        }
        .instrument(span)
        .await;

        let report = report.finish();
        report.log();
        report
    }

    /// Run batches on the poll interval (first one immediately) and on
    /// trigger, until `shutdown` flips to `true`.
    ///
    /// A batch in progress when shutdown is requested runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            max_concurrent = self.settings.max_concurrent,
            "scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => debug!("poll interval elapsed"),
                _ = self.trigger.notified() => {
                    debug!("batch triggered");
                    ticker.reset();
                }
            }
            self.run_batch().await;
        }

        info!("scheduler stopped");
    }
}

/// Run one pipeline in its own task, under a deadline.
///
/// The inner task is aborted on timeout. A git step already on the
/// blocking pool finishes in the background and its result is discarded.
async fn run_guarded(
    pipeline: Arc<Pipeline>,
    repo: Repository,
    deadline: Duration,
) -> Result<super::pipeline::RunOutcome, PipelineError> {
    let name = repo.name.clone();
    let task = tokio::spawn(async move { pipeline.run(&repo).await }.in_current_span());
    let abort = task.abort_handle();

    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join)) if join.is_panic() => {
            error!(repo = %name, "repository run panicked");
            Err(PipelineError::aborted(
                Step::Panic,
                format!("run panicked: {}", panic_message(join.into_panic())),
            ))
        }
        Ok(Err(join)) => Err(PipelineError::aborted(
            Step::Panic,
            format!("run cancelled: {}", join),
        )),
        Err(_) => {
            abort.abort();
            warn!(repo = %name, deadline_secs = deadline.as_secs(), "repository run timed out");
            Err(PipelineError::aborted(
                Step::Timeout,
                format!("deadline of {}s exceeded", deadline.as_secs()),
            ))
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{AuthorIdentity, Credentials, GitSettings, RequestSettings};
    use crate::core::types::{BranchName, RepoId};
    use crate::forge::mock::{FailOn, MockForge};
    use crate::forge::ForgeError;
    use crate::manifest::ManagerKind;
    use crate::policy::SimplePolicy;
    use crate::registry::StaticVersionSource;

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            filter_tag: "upkeep".into(),
            poll_interval: Duration::from_secs(3600),
            max_concurrent: 2,
            repo_timeout: Duration::from_secs(30),
            strict_apply: false,
        }
    }

    fn git() -> GitSettings {
        GitSettings {
            branch: BranchName::new("upkeep/dependency-update").unwrap(),
            commit_prefix: "[Upkeep]".into(),
            author: AuthorIdentity {
                name: "Upkeep".into(),
                email: "upkeep@example.com".into(),
            },
            credentials: Credentials::default(),
        }
    }

    fn repo(id: &str) -> Repository {
        Repository {
            id: RepoId::new(id),
            name: format!("group/{}", id),
            url: format!("/nonexistent/upkeep/group/{}.git", id),
            default_branch: BranchName::new("main").unwrap(),
        }
    }

    fn orchestrator(forge: MockForge) -> Orchestrator {
        let remote: Arc<dyn RemoteHandler> = Arc::new(forge);
        let pipeline = Pipeline::new(
            Arc::clone(&remote),
            Arc::new(SimplePolicy),
            Arc::new(StaticVersionSource::new()),
            vec![ManagerKind::Go],
            git(),
        );
        Orchestrator::new(remote, pipeline, settings())
    }

    mod batch {
        use super::*;

        #[tokio::test]
        async fn pending_repositories_are_skipped() {
            let title = RequestSettings {
                title: "[Upkeep] Dependency Update".into(),
                remove_source_branch: true,
                squash: false,
            };
            let forge = MockForge::with_request_settings(title.clone())
                .with_repo(repo("1"), &["upkeep"])
                .with_repo(repo("2"), &["upkeep"])
                .with_open_request(&RepoId::new("1"), &title.title)
                .with_open_request(&RepoId::new("2"), &title.title);

            let report = orchestrator(forge).run_batch().await;
            assert_eq!(report.processed(), 2);
            assert_eq!(report.pending(), 2);
            assert!(report.is_clean());
        }

        #[tokio::test]
        async fn untagged_repositories_are_not_processed() {
            let title = "[Upkeep] Dependency Update";
            let forge = MockForge::new()
                .with_repo(repo("1"), &["upkeep"])
                .with_repo(repo("2"), &["other"])
                .with_open_request(&RepoId::new("1"), title);

            let report = orchestrator(forge).run_batch().await;
            assert_eq!(report.processed(), 1);
            assert!(report.get("group/1").is_some());
        }

        #[tokio::test]
        async fn listing_failure_is_reported() {
            let forge = MockForge::new()
                .with_repo(repo("1"), &["upkeep"])
                .fail_on(FailOn::ListCandidates(ForgeError::AuthFailed("expired".into())));

            let report = orchestrator(forge).run_batch().await;
            assert_eq!(report.processed(), 0);
            assert!(report.listing_error.is_some());
            assert!(!report.is_clean());
        }

        #[tokio::test]
        async fn one_failure_does_not_stop_the_batch() {
            let forge = MockForge::new()
                .with_repo(repo("1"), &["upkeep"])
                .with_open_request(&RepoId::new("1"), "[Upkeep] Dependency Update")
                // repo 2 has no open request and an unreachable url
                .with_repo(repo("2"), &["upkeep"]);

            let report = orchestrator(forge).run_batch().await;
            assert_eq!(report.processed(), 2);
            assert_eq!(report.pending(), 1);
            assert_eq!(report.failed(), 1);
            let failed = report.get("group/2").unwrap();
            assert_eq!(failed.outcome.as_ref().unwrap_err().step, Step::Clone);
        }
    }

    mod guarded {
        use super::*;
        use std::sync::atomic::{AtomicUsize, Ordering};

        use async_trait::async_trait;

        /// Forge whose pending check misbehaves per repository name: `boom`
        /// panics, `slow` hangs, anything else waits briefly and reports an
        /// open request. Tracks how many checks run at once.
        #[derive(Default)]
        struct UnrulyForge {
            repos: Vec<Repository>,
            in_flight: AtomicUsize,
            peak: AtomicUsize,
        }

        #[async_trait]
        impl RemoteHandler for UnrulyForge {
            fn name(&self) -> &'static str {
                "unruly"
            }

            async fn list_candidates(&self, _: &str) -> Result<Vec<Repository>, ForgeError> {
                Ok(self.repos.clone())
            }

            async fn has_open_update_request(&self, repo: &Repository) -> Result<bool, ForgeError> {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                match repo.id.as_str() {
                    "boom" => {
                        self.in_flight.fetch_sub(1, Ordering::SeqCst);
                        panic!("forge exploded");
                    }
                    "slow" => {
                        self.in_flight.fetch_sub(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                    _ => {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    }
                }
                Ok(true)
            }

            async fn open_update_request(
                &self,
                _: &Repository,
                _: &str,
                _: &str,
            ) -> Result<(), ForgeError> {
                Ok(())
            }
        }

        fn unruly(ids: &[&str], max_concurrent: usize) -> (Arc<UnrulyForge>, Orchestrator) {
            let forge = Arc::new(UnrulyForge {
                repos: ids.iter().map(|id| repo(id)).collect(),
                ..Default::default()
            });
            let remote: Arc<dyn RemoteHandler> = forge.clone();
            let pipeline = Pipeline::new(
                Arc::clone(&remote),
                Arc::new(SimplePolicy),
                Arc::new(StaticVersionSource::new()),
                vec![ManagerKind::Go],
                git(),
            );
            let settings = SchedulerSettings {
                max_concurrent,
                repo_timeout: Duration::from_millis(200),
                ..settings()
            };
            (forge, Orchestrator::new(remote, pipeline, settings))
        }

        #[tokio::test]
        async fn panic_and_timeout_are_isolated() {
            let (_, orchestrator) = unruly(&["boom", "slow", "ok"], 1);

            let report = tokio::time::timeout(Duration::from_secs(10), orchestrator.run_batch())
                .await
                .unwrap();

            assert_eq!(report.processed(), 3);
            assert_eq!(report.failed(), 2);
            assert_eq!(report.pending(), 1);

            let boom = report.get("group/boom").unwrap().outcome.as_ref().unwrap_err();
            assert_eq!(boom.step, Step::Panic);
            assert!(boom.to_string().contains("forge exploded"));

            let slow = report.get("group/slow").unwrap().outcome.as_ref().unwrap_err();
            assert_eq!(slow.step, Step::Timeout);

            assert!(report.get("group/ok").unwrap().outcome.is_ok());
        }

        #[tokio::test]
        async fn concurrency_is_bounded() {
            let ids = ["a", "b", "c", "d", "e", "f", "g"];
            let (forge, orchestrator) = unruly(&ids, 2);

            let report = orchestrator.run_batch().await;

            assert_eq!(report.pending(), ids.len());
            let peak = forge.peak.load(Ordering::SeqCst);
            assert!(peak <= 2, "{} runs were in flight at once", peak);
            assert!(peak >= 1);
        }

        #[test]
        fn panic_payloads() {
            assert_eq!(panic_message(Box::new("boom")), "boom");
            assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
            assert_eq!(panic_message(Box::new(7u8)), "unknown panic");
        }
    }

    mod scheduler {
        use super::*;

        #[tokio::test]
        async fn stops_on_shutdown() {
            let orchestrator = orchestrator(MockForge::new());
            let (tx, rx) = watch::channel(false);

            let stopper = async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                tx.send(true).unwrap();
            };
            let finished = tokio::time::timeout(Duration::from_secs(5), async {
                tokio::join!(orchestrator.run(rx), stopper);
            })
            .await;
            assert!(finished.is_ok());
        }

        #[tokio::test]
        async fn already_shut_down_runs_nothing() {
            let forge = MockForge::new();
            let handle = forge.clone();
            let orchestrator = orchestrator(forge);
            let (_tx, rx) = watch::channel(true);

            orchestrator.run(rx).await;
            assert!(handle.operations().is_empty());
        }
    }
}
