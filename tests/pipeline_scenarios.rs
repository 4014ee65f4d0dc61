//! End-to-end pipeline tests.
//!
//! Each test builds a real bare "origin" repository with git2, then drives
//! the pipeline against it with a mock forge and an in-memory version
//! source.

use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use tempfile::TempDir;

use upkeep::core::config::{AuthorIdentity, Credentials, GitSettings};
use upkeep::core::types::{
    BranchName, DependencySet, PlannedUpdate, RepoId, Repository, UpdateDecision,
};
use upkeep::engine::{Pipeline, RunOutcome, Step, StepError};
use upkeep::forge::mock::{MockForge, MockOperation};
use upkeep::forge::RemoteHandler;
use upkeep::manifest::{DependencyManager, ManagerKind, ManifestError};
use upkeep::policy::{SimplePolicy, UpdatePolicy};
use upkeep::registry::{LookupError, StaticVersionSource};

const UPDATE_BRANCH: &str = "upkeep/dependency-update";
const UPDATE_REF: &str = "refs/heads/upkeep/dependency-update";
const TITLE: &str = "[Upkeep] Dependency Update";

/// Bare repository with one commit on `main`.
struct Origin {
    dir: TempDir,
}

impl Origin {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let repo = git2::Repository::init_bare(dir.path()).unwrap();
        let mut builder = repo.treebuilder(None).unwrap();
        for (name, contents) in files {
            let blob = repo.blob(contents.as_bytes()).unwrap();
            builder.insert(*name, blob, 0o100644).unwrap();
        }
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let sig = git2::Signature::now("Seed", "seed@example.com").unwrap();
        repo.commit(Some("refs/heads/main"), &sig, &sig, "seed", &tree, &[])
            .unwrap();
        repo.set_head("refs/heads/main").unwrap();
        Self { dir }
    }

    fn repository(&self) -> Repository {
        Repository {
            id: RepoId::new("42"),
            name: "group/service".into(),
            url: self.dir.path().to_string_lossy().into_owned(),
            default_branch: BranchName::new("main").unwrap(),
        }
    }

    fn open(&self) -> git2::Repository {
        git2::Repository::open_bare(self.dir.path()).unwrap()
    }

    fn main_head(&self) -> git2::Oid {
        self.open().refname_to_id("refs/heads/main").unwrap()
    }

    fn has_update_branch(&self) -> bool {
        self.open().find_reference(UPDATE_REF).is_ok()
    }

    /// Number of commits reachable from the update branch.
    fn update_branch_len(&self) -> usize {
        let repo = self.open();
        let mut walk = repo.revwalk().unwrap();
        walk.push_ref(UPDATE_REF).unwrap();
        walk.count()
    }

    fn file_on_update_branch(&self, name: &str) -> Vec<u8> {
        let repo = self.open();
        let commit = repo
            .find_reference(UPDATE_REF)
            .unwrap()
            .peel_to_commit()
            .unwrap();
        let entry = commit.tree().unwrap().get_name(name).unwrap().id();
        let blob = repo.find_blob(entry).unwrap();
        blob.content().to_vec()
    }
}

fn git_settings() -> GitSettings {
    GitSettings {
        branch: BranchName::new(UPDATE_BRANCH).unwrap(),
        commit_prefix: "[Upkeep]".into(),
        author: AuthorIdentity {
            name: "Upkeep Bot".into(),
            email: "upkeep@example.com".into(),
        },
        credentials: Credentials::default(),
    }
}

fn pipeline(forge: &MockForge, source: StaticVersionSource) -> Pipeline {
    pipeline_with_policy(forge, source, Arc::new(SimplePolicy))
}

fn pipeline_with_policy(
    forge: &MockForge,
    source: StaticVersionSource,
    policy: Arc<dyn UpdatePolicy>,
) -> Pipeline {
    let remote: Arc<dyn RemoteHandler> = Arc::new(forge.clone());
    Pipeline::new(
        remote,
        policy,
        Arc::new(source),
        vec![ManagerKind::Go],
        git_settings(),
    )
}

const ONE_DEP: &str = "module example.com/service

go 1.21

require (
\texample.com/libfoo v1.0.0
\tgolang.org/x/sys v0.15.0 // indirect
)
";

fn opened_requests(forge: &MockForge) -> usize {
    forge
        .operations()
        .iter()
        .filter(|op| matches!(op, MockOperation::OpenRequest { .. }))
        .count()
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn newer_release_is_committed_and_proposed() {
        let origin = Origin::new(&[("go.mod", ONE_DEP), ("README.md", "# service\n")]);
        let repo = origin.repository();
        let forge = MockForge::new().with_repo(repo.clone(), &["upkeep"]);
        let source = StaticVersionSource::new()
            .with("example.com/libfoo", "v1.2.0")
            .with("golang.org/x/sys", "v0.20.0");

        let outcome = pipeline(&forge, source).run(&repo).await.unwrap();

        let (updates, not_found, commit) = match outcome {
            RunOutcome::Updated {
                updates,
                not_found,
                commit,
            } => (updates, not_found, commit),
            other => panic!("expected an update, got {:?}", other),
        };
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].name, "example.com/libfoo");
        assert!(not_found.is_empty());

        // Exactly the version token changed
        let expected = ONE_DEP.replace("libfoo v1.0.0", "libfoo v1.2.0");
        assert_eq!(origin.file_on_update_branch("go.mod"), expected.as_bytes());
        assert_eq!(origin.file_on_update_branch("README.md"), b"# service\n");

        let remote = origin.open();
        let pushed = remote
            .find_reference(UPDATE_REF)
            .unwrap()
            .peel_to_commit()
            .unwrap();
        assert_eq!(pushed.id().to_string(), commit.as_str());
        assert_eq!(pushed.parent_count(), 1);
        assert_eq!(pushed.parent_id(0).unwrap(), origin.main_head());
        assert_eq!(pushed.author().email(), Some("upkeep@example.com"));
        assert!(pushed
            .message()
            .unwrap()
            .starts_with("[Upkeep] Update dependencies\n\n- example.com/libfoo v1.0.0 -> v1.2.0"));

        let requests = forge.open_requests(&repo.id);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].title, TITLE);
        assert_eq!(requests[0].source_branch, UPDATE_BRANCH);
        assert_eq!(requests[0].target_branch, "main");
    }

    #[tokio::test]
    async fn no_newer_release_means_no_commit() {
        let origin = Origin::new(&[(
            "go.mod",
            "module example.com/service\n\nrequire example.com/libfoo v2.0.0\n",
        )]);
        let repo = origin.repository();
        let forge = MockForge::new().with_repo(repo.clone(), &["upkeep"]);
        let source = StaticVersionSource::new().with("example.com/libfoo", "v1.9.0");

        let outcome = pipeline(&forge, source).run(&repo).await.unwrap();

        assert_eq!(outcome, RunOutcome::UpToDate);
        assert!(!origin.has_update_branch());
        assert_eq!(opened_requests(&forge), 0);
    }

    #[tokio::test]
    async fn open_request_skips_before_clone() {
        // An unreachable url proves no clone was attempted
        let repo = Repository {
            id: RepoId::new("7"),
            name: "group/pending".into(),
            url: "/nonexistent/upkeep/pending.git".into(),
            default_branch: BranchName::new("main").unwrap(),
        };
        let forge = MockForge::new()
            .with_repo(repo.clone(), &["upkeep"])
            .with_open_request(&repo.id, TITLE);
        let source = StaticVersionSource::new();

        let outcome = pipeline(&forge, source).run(&repo).await.unwrap();

        assert_eq!(outcome, RunOutcome::AlreadyPending);
        assert_eq!(
            forge.operations(),
            vec![MockOperation::HasOpenRequest {
                repo: repo.id.clone()
            }]
        );
    }

    #[tokio::test]
    async fn failed_lookup_aborts_the_repository() {
        let origin = Origin::new(&[(
            "go.mod",
            "module example.com/service

require (
\texample.com/a v1.0.0
\texample.com/b v1.0.0
\texample.com/c v1.0.0
)
",
        )]);
        let repo = origin.repository();
        let forge = MockForge::new().with_repo(repo.clone(), &["upkeep"]);
        let source = StaticVersionSource::new()
            .with("example.com/a", "v2.0.0")
            .with_failure("example.com/b")
            .with("example.com/c", "v2.0.0");

        let err = pipeline(&forge, source).run(&repo).await.unwrap_err();

        assert_eq!(err.step, Step::Decide);
        assert!(matches!(
            err.source,
            StepError::Lookup(LookupError::Network(_))
        ));
        assert!(!origin.has_update_branch());
        assert_eq!(opened_requests(&forge), 0);
    }
}

mod properties {
    use super::*;

    #[tokio::test]
    async fn second_run_is_pending_without_new_commit() {
        let origin = Origin::new(&[("go.mod", ONE_DEP)]);
        let repo = origin.repository();
        let forge = MockForge::new().with_repo(repo.clone(), &["upkeep"]);
        let source = StaticVersionSource::new()
            .with("example.com/libfoo", "v1.2.0")
            .with("golang.org/x/sys", "v0.15.0");
        let pipeline = pipeline(&forge, source);

        let first = pipeline.run(&repo).await.unwrap();
        assert!(matches!(first, RunOutcome::Updated { .. }));
        let commits = origin.update_branch_len();

        let second = pipeline.run(&repo).await.unwrap();
        assert_eq!(second, RunOutcome::AlreadyPending);
        assert_eq!(origin.update_branch_len(), commits);
        assert_eq!(forge.open_requests(&repo.id).len(), 1);
    }

    #[tokio::test]
    async fn rerun_after_merge_of_other_work_replaces_branch() {
        let origin = Origin::new(&[("go.mod", ONE_DEP)]);
        let repo = origin.repository();
        let forge = MockForge::new().with_repo(repo.clone(), &["upkeep"]);
        let source = StaticVersionSource::new()
            .with("example.com/libfoo", "v1.2.0")
            .with("golang.org/x/sys", "v0.15.0");
        let pipeline = pipeline(&forge, source);

        pipeline.run(&repo).await.unwrap();
        forge.close_requests(&repo.id);

        // Default branch unchanged: the branch is rebuilt from it and force-pushed
        let outcome = pipeline.run(&repo).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Updated { .. }));
        assert_eq!(origin.update_branch_len(), 2);
        assert_eq!(forge.open_requests(&repo.id).len(), 1);
    }
}

mod skips {
    use super::*;

    #[tokio::test]
    async fn repository_without_manifest() {
        let origin = Origin::new(&[("package.json", "{}\n")]);
        let repo = origin.repository();
        let forge = MockForge::new().with_repo(repo.clone(), &["upkeep"]);

        let outcome = pipeline(&forge, StaticVersionSource::new())
            .run(&repo)
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::NoManifest);
        assert!(!origin.has_update_branch());
    }

    #[tokio::test]
    async fn unparseable_manifest_fails_at_parse() {
        let origin = Origin::new(&[("go.mod", "module m\n\nrequire (\n\texample.com/a\n")]);
        let repo = origin.repository();
        let forge = MockForge::new().with_repo(repo.clone(), &["upkeep"]);

        let err = pipeline(&forge, StaticVersionSource::new())
            .run(&repo)
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::Parse);
        assert!(!origin.has_update_branch());
    }

    #[tokio::test]
    async fn failed_request_is_reported_after_push() {
        use upkeep::forge::mock::FailOn;
        use upkeep::forge::ForgeError;

        let origin = Origin::new(&[("go.mod", ONE_DEP)]);
        let repo = origin.repository();
        let forge = MockForge::new()
            .with_repo(repo.clone(), &["upkeep"])
            .fail_on(FailOn::OpenRequest(ForgeError::RateLimited));
        let source = StaticVersionSource::new()
            .with("example.com/libfoo", "v1.2.0")
            .with("golang.org/x/sys", "v0.15.0");

        let err = pipeline(&forge, source).run(&repo).await.unwrap_err();

        assert_eq!(err.step, Step::OpenRequest);
        assert!(origin.has_update_branch());
    }
}

mod mutation {
    use super::*;

    /// Decides fixed updates regardless of what the manifest declares.
    struct FixedPolicy(Vec<PlannedUpdate>);

    #[async_trait]
    impl UpdatePolicy for FixedPolicy {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn decide(
            &self,
            _deps: &DependencySet,
            _manager: &dyn DependencyManager,
        ) -> Result<UpdateDecision, LookupError> {
            let mut decision = UpdateDecision::new();
            for update in &self.0 {
                decision.push(update.clone());
            }
            Ok(decision)
        }
    }

    fn planned(name: &str, from: &str, to: &str) -> PlannedUpdate {
        PlannedUpdate {
            name: name.into(),
            from: Version::parse(from).unwrap(),
            to: Version::parse(to).unwrap(),
        }
    }

    fn ghost_and_libfoo() -> Arc<dyn UpdatePolicy> {
        Arc::new(FixedPolicy(vec![
            planned("example.com/ghost", "1.0.0", "1.1.0"),
            planned("example.com/libfoo", "1.0.0", "1.2.0"),
        ]))
    }

    #[tokio::test]
    async fn missing_dependency_is_reported_and_rest_applied() {
        let origin = Origin::new(&[("go.mod", ONE_DEP)]);
        let repo = origin.repository();
        let forge = MockForge::new().with_repo(repo.clone(), &["upkeep"]);

        let outcome = pipeline_with_policy(&forge, StaticVersionSource::new(), ghost_and_libfoo())
            .run(&repo)
            .await
            .unwrap();

        match outcome {
            RunOutcome::Updated {
                updates, not_found, ..
            } => {
                assert_eq!(updates.len(), 1);
                assert_eq!(updates[0].name, "example.com/libfoo");
                assert_eq!(not_found, vec!["example.com/ghost".to_string()]);
            }
            other => panic!("expected an update, got {:?}", other),
        }
        let expected = ONE_DEP.replace("libfoo v1.0.0", "libfoo v1.2.0");
        assert_eq!(origin.file_on_update_branch("go.mod"), expected.as_bytes());
        assert_eq!(opened_requests(&forge), 1);
    }

    #[tokio::test]
    async fn nothing_applicable_is_up_to_date() {
        let origin = Origin::new(&[("go.mod", ONE_DEP)]);
        let repo = origin.repository();
        let forge = MockForge::new().with_repo(repo.clone(), &["upkeep"]);
        let policy = Arc::new(FixedPolicy(vec![planned(
            "example.com/ghost",
            "1.0.0",
            "1.1.0",
        )]));

        let outcome = pipeline_with_policy(&forge, StaticVersionSource::new(), policy)
            .run(&repo)
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::UpToDate);
        assert!(!origin.has_update_branch());
        assert_eq!(opened_requests(&forge), 0);
    }

    #[tokio::test]
    async fn strict_apply_fails_at_mutate() {
        let origin = Origin::new(&[("go.mod", ONE_DEP)]);
        let repo = origin.repository();
        let forge = MockForge::new().with_repo(repo.clone(), &["upkeep"]);

        let err = pipeline_with_policy(&forge, StaticVersionSource::new(), ghost_and_libfoo())
            .strict_apply(true)
            .run(&repo)
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::Mutate);
        assert!(matches!(
            err.source,
            StepError::Manifest(ManifestError::NotFound(ref name)) if name == "example.com/ghost"
        ));
        assert!(!origin.has_update_branch());
        assert_eq!(opened_requests(&forge), 0);
    }
}
