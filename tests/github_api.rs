//! GitHub handler against a mock HTTP server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use upkeep::core::config::{ForgeSettings, RequestSettings};
use upkeep::core::types::{BranchName, RepoId, Repository};
use upkeep::forge::github::GitHubForge;
use upkeep::forge::{ForgeError, RemoteHandler};

const TITLE: &str = "[Upkeep] Dependency Update";

fn forge(server: &MockServer) -> GitHubForge {
    GitHubForge::new(
        &ForgeSettings {
            url: server.uri(),
            token: "ghp_test".into(),
            timeout: Duration::from_secs(5),
        },
        RequestSettings {
            title: TITLE.into(),
            remove_source_branch: true,
            squash: true,
        },
    )
    .unwrap()
}

fn repository() -> Repository {
    Repository {
        id: RepoId::new("acme/service"),
        name: "acme/service".into(),
        url: "https://github.com/acme/service.git".into(),
        default_branch: BranchName::new("main").unwrap(),
    }
}

fn repo_json(name: &str, topics: &[&str], archived: bool, size: u64) -> serde_json::Value {
    json!({
        "full_name": format!("acme/{}", name),
        "clone_url": format!("https://github.com/acme/{}.git", name),
        "default_branch": "main",
        "topics": topics,
        "archived": archived,
        "size": size,
    })
}

mod list_candidates {
    use super::*;

    #[tokio::test]
    async fn filters_by_topic_archived_and_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .and(header("authorization", "Bearer ghp_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                repo_json("service", &["upkeep", "go"], false, 120),
                repo_json("docs", &["docs"], false, 50),
                repo_json("legacy", &["upkeep"], true, 80),
                repo_json("fresh", &["upkeep"], false, 0),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let repos = forge(&server).list_candidates("upkeep").await.unwrap();

        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].id.as_str(), "acme/service");
        assert_eq!(repos[0].url, "https://github.com/acme/service.git");
    }

    #[tokio::test]
    async fn rate_limit_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "message": "API rate limit exceeded for user ID 1."
            })))
            .mount(&server)
            .await;

        let err = forge(&server).list_candidates("upkeep").await.unwrap_err();
        assert!(matches!(err, ForgeError::RateLimited));
    }
}

mod open_requests {
    use super::*;

    #[tokio::test]
    async fn marker_title_counts_as_pending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/service/pulls"))
            .and(query_param("state", "open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"number": 3, "title": "Fix typo", "html_url": null},
                {"number": 8, "title": TITLE, "html_url": null},
            ])))
            .mount(&server)
            .await;

        assert!(forge(&server)
            .has_open_update_request(&repository())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn no_marker_means_not_pending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/service/pulls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        assert!(!forge(&server)
            .has_open_update_request(&repository())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_repository_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/service/pulls"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        let err = forge(&server)
            .has_open_update_request(&repository())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::NotFound(_)));
    }
}

mod create {
    use super::*;

    #[tokio::test]
    async fn posts_head_base_and_title_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/service/pulls"))
            .and(body_json(json!({
                "head": "upkeep/dependency-update",
                "base": "main",
                "title": TITLE,
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "number": 12,
                "title": TITLE,
                "html_url": "https://github.com/acme/service/pull/12",
            })))
            .expect(1)
            .mount(&server)
            .await;

        forge(&server)
            .open_update_request(&repository(), "upkeep/dependency-update", "main")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn validation_failure_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/service/pulls"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"message": "Validation Failed"})),
            )
            .mount(&server)
            .await;

        let err = forge(&server)
            .open_update_request(&repository(), "upkeep/dependency-update", "main")
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ApiError { status: 422, .. }));
    }
}
