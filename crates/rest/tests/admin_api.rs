//! Admin and probe endpoint tests.
//!
//! Covers:
//! - Health, liveness and readiness probes
//! - Superuser checks on the reindex endpoints
//! - Single-flight reindexing (409 while another reindex runs)
//! - Report status codes (200 clean, 502 with failed runs)

mod common;

use axum::http::StatusCode;
use serde_json::Value;

use common::*;

// =============================================================================
// Probes
// =============================================================================

mod probes {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_backends() {
        let app = create_test_app();

        let response = app.server.get("/health").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["backend"], "sqlite");
        assert_eq!(body["index"], "memory");
        assert_eq!(body["reindexing"], false);
    }

    #[tokio::test]
    async fn test_liveness() {
        let app = create_test_app();
        app.server.get("/_liveness").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_readiness() {
        let app = create_test_app();

        let response = app.server.get("/_readiness").await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"]["storage"], "ok");
        assert_eq!(body["checks"]["index"], "ok");
    }

    #[tokio::test]
    async fn test_readiness_fails_when_search_engine_is_down() {
        let app = create_test_app();
        app.index.set_down(true);

        let response = app.server.get("/_readiness").await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json();
        assert_eq!(body["status"], "unavailable");
        assert_eq!(body["checks"]["storage"], "ok");
        assert!(body["checks"]["index"].as_str().unwrap().contains("down"));

        app.index.set_down(false);
        app.server.get("/_readiness").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_readiness_fails_when_registries_index_errors() {
        let app = create_test_app();
        app.index.set_unavailable(REGISTRIES_INDEX, true);

        let response = app.server.get("/_readiness").await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json();
        assert!(
            body["checks"]["index"]
                .as_str()
                .unwrap()
                .contains(REGISTRIES_INDEX)
        );
    }
}

// =============================================================================
// Authorization
// =============================================================================

mod authorization {
    use super::*;

    #[tokio::test]
    async fn test_reindex_without_token_is_unauthorized() {
        let app = create_test_app();

        let response = app.server.post("/admin/reindex").await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["meta"]["code"], 401);
        assert!(app.index.index_names().is_empty());
    }

    #[tokio::test]
    async fn test_reindex_with_editor_token_is_unauthorized() {
        let app = create_seeded_app(&["red"]).await;

        let response = app
            .server
            .post("/admin/reindex/types/codes")
            .add_header(AUTHORIZATION, EDITOR)
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_reindex_with_unknown_token_is_unauthorized() {
        let app = create_test_app();

        let response = app
            .server
            .post("/admin/reindex")
            .add_header(AUTHORIZATION, STRANGER)
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }
}

// =============================================================================
// Reindexing
// =============================================================================

mod reindex {
    use super::*;

    #[tokio::test]
    async fn test_reindex_everything() {
        let app = create_seeded_app(&["red", "green"]).await;

        let response = app
            .server
            .post("/admin/reindex")
            .add_header(AUTHORIZATION, ADMIN)
            .await;

        response.assert_status_ok();
        let report: Value = response.json();
        let runs = report["runs"].as_array().expect("runs");
        let indices: Vec<&str> = runs.iter().map(|r| r["index"].as_str().unwrap()).collect();
        assert_eq!(indices, vec![REGISTRIES_INDEX, JHS_INDEX, MAIN_INDEX]);
        assert!(report["completedAt"].is_string());

        assert_eq!(app.index.document_count(REGISTRIES_INDEX), 1);
        assert_eq!(app.index.document_count(JHS_INDEX), 1);
        assert_eq!(app.index.document_count(MAIN_INDEX), 2);
        assert!(!app.state.is_reindexing());
    }

    #[tokio::test]
    async fn test_reindex_scheme() {
        let app = create_seeded_app(&["red"]).await;

        let response = app
            .server
            .post("/admin/reindex/coderegistries/jhs/codeschemes/colors")
            .add_header(AUTHORIZATION, ADMIN)
            .await;

        response.assert_status_ok();
        let report: Value = response.json();
        assert_eq!(report["runs"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_reindex_missing_scheme_is_not_found() {
        let app = create_seeded_app(&[]).await;

        let response = app
            .server
            .post("/admin/reindex/coderegistries/jhs/codeschemes/missing")
            .add_header(AUTHORIZATION, ADMIN)
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
        assert!(!app.state.is_reindexing());
    }

    #[tokio::test]
    async fn test_reindex_type_accepts_plural() {
        let app = create_seeded_app(&["red", "green", "blue"]).await;

        let response = app
            .server
            .post("/admin/reindex/types/codes")
            .add_header(AUTHORIZATION, ADMIN)
            .await;

        response.assert_status_ok();
        assert_eq!(app.index.document_count(MAIN_INDEX), 3);
    }

    #[tokio::test]
    async fn test_reindex_unknown_type_is_bad_request() {
        let app = create_test_app();

        let response = app
            .server
            .post("/admin/reindex/types/widgets")
            .add_header(AUTHORIZATION, ADMIN)
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["meta"]["errorCode"], "invalid");
    }

    #[tokio::test]
    async fn test_concurrent_reindex_is_conflict() {
        let app = create_seeded_app(&["red"]).await;
        let permit = app.state.try_begin_reindex().expect("reindex slot");

        let response = app
            .server
            .post("/admin/reindex")
            .add_header(AUTHORIZATION, ADMIN)
            .await;
        response.assert_status(StatusCode::CONFLICT);

        drop(permit);
        app.server
            .post("/admin/reindex")
            .add_header(AUTHORIZATION, ADMIN)
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_failed_run_is_bad_gateway_with_report() {
        let app = create_seeded_app(&["red"]).await;
        app.index.set_unavailable(REGISTRIES_INDEX, true);

        let response = app
            .server
            .post("/admin/reindex")
            .add_header(AUTHORIZATION, ADMIN)
            .await;

        response.assert_status(StatusCode::BAD_GATEWAY);
        let report: Value = response.json();
        let runs = report["runs"].as_array().expect("runs");
        assert_eq!(runs.len(), 3);
        assert!(runs[0]["error"].is_string());
        assert!(runs[2]["error"].is_null());
        assert_eq!(app.index.document_count(MAIN_INDEX), 1);
        assert!(!app.state.is_reindexing());
    }
}
