//! Content endpoint tests.
//!
//! Covers:
//! - Registry and scheme upserts and path binding
//! - Code batch upserts, hierarchy validation and deletion
//! - Mass status changes and the demotion guard
//! - Extensions with generated members, member upserts and deletion
//! - Index synchronization failures surfacing as warnings

mod common;

use axum::http::StatusCode;
use serde_json::{Value, json};

use common::*;

fn code_values(body: &Value) -> Vec<String> {
    body.as_array()
        .expect("array body")
        .iter()
        .map(|c| c["codeValue"].as_str().unwrap().to_string())
        .collect()
}

fn find<'a>(codes: &'a Value, code_value: &str) -> &'a Value {
    codes
        .as_array()
        .expect("array body")
        .iter()
        .find(|c| c["codeValue"] == code_value)
        .unwrap_or_else(|| panic!("code {code_value} missing"))
}

// =============================================================================
// Registries and Schemes
// =============================================================================

mod registries {
    use super::*;

    #[tokio::test]
    async fn test_upsert_registry_requires_superuser() {
        let app = create_test_app();
        let body = json!({ "prefLabel": { "fi": "Julkisen hallinnon suositukset" } });

        app.server
            .put("/coderegistries/jhs")
            .json(&body)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        app.server
            .put("/coderegistries/jhs")
            .add_header(AUTHORIZATION, EDITOR)
            .json(&body)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let response = app
            .server
            .put("/coderegistries/jhs")
            .add_header(AUTHORIZATION, ADMIN)
            .json(&body)
            .await;

        response.assert_status_ok();
        let result: Value = response.json();
        assert_eq!(result["value"]["codeValue"], "jhs");
        assert_eq!(result["value"]["uri"], "http://uri.suomi.fi/codelist/jhs");
        assert!(result.get("warnings").is_none());
        assert_eq!(app.index.document_count(REGISTRIES_INDEX), 1);
    }

    #[tokio::test]
    async fn test_body_code_value_must_match_path() {
        let app = create_test_app();

        let response = app
            .server
            .put("/coderegistries/jhs")
            .add_header(AUTHORIZATION, ADMIN)
            .json(&json!({ "codeValue": "other" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_editor_upserts_scheme() {
        let app = create_seeded_app(&[]).await;

        let response = app
            .server
            .put("/coderegistries/jhs/codeschemes/shapes")
            .add_header(AUTHORIZATION, EDITOR)
            .json(&json!({ "prefLabel": { "en": "Shapes" } }))
            .await;

        response.assert_status_ok();
        let result: Value = response.json();
        assert_eq!(result["value"]["codeValue"], "shapes");
        assert_eq!(app.index.document_count(JHS_INDEX), 2);
    }

    #[tokio::test]
    async fn test_scheme_in_missing_registry_is_not_found() {
        let app = create_test_app();

        let response = app
            .server
            .put("/coderegistries/nope/codeschemes/shapes")
            .add_header(AUTHORIZATION, ADMIN)
            .json(&json!({}))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["meta"]["code"], 404);
    }
}

// =============================================================================
// Codes
// =============================================================================

mod codes {
    use super::*;

    #[tokio::test]
    async fn test_upsert_hierarchy() {
        let app = create_seeded_app(&[]).await;

        let response = app
            .server
            .post(&format!("{COLORS}/codes"))
            .add_header(AUTHORIZATION, EDITOR)
            .json(&json!([
                { "codeValue": "c", "broaderCode": { "codeValue": "b" } },
                { "codeValue": "b", "broaderCode": { "codeValue": "a" } },
                { "codeValue": "a" }
            ]))
            .await;

        response.assert_status_ok();
        let result: Value = response.json();
        assert_eq!(find(&result["value"], "a")["hierarchyLevel"], 1);
        assert_eq!(find(&result["value"], "b")["hierarchyLevel"], 2);
        assert_eq!(find(&result["value"], "c")["hierarchyLevel"], 3);
        assert_eq!(find(&result["value"], "a")["status"], "DRAFT");
        assert_eq!(app.index.document_count(MAIN_INDEX), 3);
    }

    #[tokio::test]
    async fn test_cycle_is_not_acceptable() {
        let app = create_seeded_app(&[]).await;
        app.server
            .post(&format!("{COLORS}/codes"))
            .add_header(AUTHORIZATION, ADMIN)
            .json(&json!([
                { "codeValue": "a" },
                { "codeValue": "b", "broaderCode": { "codeValue": "a" } }
            ]))
            .await
            .assert_status_ok();

        let response = app
            .server
            .post(&format!("{COLORS}/codes"))
            .add_header(AUTHORIZATION, ADMIN)
            .json(&json!([{ "codeValue": "a", "broaderCode": { "codeValue": "b" } }]))
            .await;

        response.assert_status(StatusCode::NOT_ACCEPTABLE);
        let body: Value = response.json();
        assert_eq!(body["meta"]["code"], 406);
        assert_eq!(body["meta"]["errorCode"], "validation");

        let listed: Value = app.server.get(&format!("{COLORS}/codes")).await.json();
        assert!(find(&listed, "a")["broaderCodeId"].is_null());
    }

    #[tokio::test]
    async fn test_anonymous_upsert_is_unauthorized() {
        let app = create_seeded_app(&[]).await;

        let response = app
            .server
            .post(&format!("{COLORS}/codes"))
            .json(&json!([{ "codeValue": "a" }]))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        let listed: Value = app.server.get(&format!("{COLORS}/codes")).await.json();
        assert!(code_values(&listed).is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_is_bad_request() {
        let app = create_seeded_app(&[]).await;

        app.server
            .post(&format!("{COLORS}/codes"))
            .add_header(AUTHORIZATION, ADMIN)
            .json(&json!([]))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_codes_in_order() {
        let app = create_seeded_app(&["red", "green", "blue"]).await;

        let response = app.server.get(&format!("{COLORS}/codes")).await;

        response.assert_status_ok();
        assert_eq!(code_values(&response.json()), vec!["red", "green", "blue"]);
    }

    #[tokio::test]
    async fn test_delete_code() {
        let app = create_seeded_app(&["red", "green"]).await;

        let response = app
            .server
            .delete(&format!("{COLORS}/codes/red"))
            .add_header(AUTHORIZATION, EDITOR)
            .await;

        response.assert_status_ok();
        let result: Value = response.json();
        assert_eq!(result["value"]["codeValue"], "red");

        let listed: Value = app.server.get(&format!("{COLORS}/codes")).await.json();
        assert_eq!(code_values(&listed), vec!["green"]);
        assert_eq!(app.index.document_count(MAIN_INDEX), 1);

        app.server
            .delete(&format!("{COLORS}/codes/red"))
            .add_header(AUTHORIZATION, EDITOR)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_index_failure_is_a_warning() {
        let app = create_seeded_app(&[]).await;
        app.index.set_unavailable(MAIN_INDEX, true);

        let response = app
            .server
            .post(&format!("{COLORS}/codes"))
            .add_header(AUTHORIZATION, ADMIN)
            .json(&json!([{ "codeValue": "a" }]))
            .await;

        response.assert_status_ok();
        let result: Value = response.json();
        assert!(!result["warnings"].as_array().expect("warnings").is_empty());

        let listed: Value = app.server.get(&format!("{COLORS}/codes")).await.json();
        assert_eq!(code_values(&listed), vec!["a"]);
    }
}

// =============================================================================
// Status Changes
// =============================================================================

mod statuses {
    use super::*;

    async fn seed_valid(app: &TestApp) {
        app.server
            .post(&format!("{COLORS}/codes"))
            .add_header(AUTHORIZATION, ADMIN)
            .json(&json!([
                { "codeValue": "a", "status": "VALID" },
                { "codeValue": "b", "status": "VALID" }
            ]))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_editor_cannot_demote_published_codes() {
        let app = create_seeded_app(&[]).await;
        seed_valid(&app).await;

        let response = app
            .server
            .post(&format!("{COLORS}/codes/status"))
            .add_header(AUTHORIZATION, EDITOR)
            .json(&json!({ "initialStatus": "VALID", "endStatus": "DRAFT" }))
            .await;

        response.assert_status(StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_superuser_mass_status_change() {
        let app = create_seeded_app(&[]).await;
        seed_valid(&app).await;

        let response = app
            .server
            .post(&format!("{COLORS}/codes/status"))
            .add_header(AUTHORIZATION, ADMIN)
            .json(&json!({ "initialStatus": "VALID", "endStatus": "DRAFT" }))
            .await;

        response.assert_status_ok();
        let listed: Value = app.server.get(&format!("{COLORS}/codes")).await.json();
        for code in listed.as_array().unwrap() {
            assert_eq!(code["status"], "DRAFT");
        }
    }

    #[tokio::test]
    async fn test_editor_may_retire() {
        let app = create_seeded_app(&[]).await;
        seed_valid(&app).await;

        app.server
            .post(&format!("{COLORS}/codes/status"))
            .add_header(AUTHORIZATION, EDITOR)
            .json(&json!({ "initialStatus": "VALID", "endStatus": "RETIRED" }))
            .await
            .assert_status_ok();
    }
}

// =============================================================================
// Extensions and Members
// =============================================================================

mod extensions {
    use super::*;

    fn hierarchy_extension() -> Value {
        json!({
            "codeValue": "groups",
            "propertyType": { "localName": "definitionHierarchy" }
        })
    }

    #[tokio::test]
    async fn test_extension_with_generated_members() {
        let app = create_seeded_app(&["red", "green"]).await;

        let response = app
            .server
            .post(&format!("{COLORS}/extensions?autoCreateMembers=true"))
            .add_header(AUTHORIZATION, EDITOR)
            .json(&hierarchy_extension())
            .await;

        response.assert_status_ok();
        let result: Value = response.json();
        assert_eq!(result["value"]["codeValue"], "groups");

        let extensions: Value = app.server.get(&format!("{COLORS}/extensions")).await.json();
        assert_eq!(extensions.as_array().map(Vec::len), Some(1));

        let members: Value = app
            .server
            .get(&format!("{COLORS}/extensions/groups/members"))
            .await
            .json();
        let orders: Vec<i64> = members
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["order"].as_i64().unwrap())
            .collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_extension_without_generated_members() {
        let app = create_seeded_app(&["red"]).await;

        app.server
            .post(&format!("{COLORS}/extensions"))
            .add_header(AUTHORIZATION, EDITOR)
            .json(&hierarchy_extension())
            .await
            .assert_status_ok();

        let members: Value = app
            .server
            .get(&format!("{COLORS}/extensions/groups/members"))
            .await
            .json();
        assert_eq!(members.as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_members_in_missing_extension_are_not_found() {
        let app = create_seeded_app(&["red"]).await;

        app.server
            .post(&format!("{COLORS}/extensions/missing/members"))
            .add_header(AUTHORIZATION, EDITOR)
            .json(&json!([{ "code": { "codeValue": "red" } }]))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upsert_and_delete_member() {
        let app = create_seeded_app(&["red", "green"]).await;
        app.server
            .post(&format!("{COLORS}/extensions"))
            .add_header(AUTHORIZATION, EDITOR)
            .json(&hierarchy_extension())
            .await
            .assert_status_ok();

        let response = app
            .server
            .post(&format!("{COLORS}/extensions/groups/members"))
            .add_header(AUTHORIZATION, EDITOR)
            .json(&json!([
                { "code": { "codeValue": "red" } },
                { "code": { "codeValue": "green" } }
            ]))
            .await;
        response.assert_status_ok();
        let result: Value = response.json();
        let member_id = result["value"][0]["id"].as_str().unwrap().to_string();

        let path = format!("{COLORS}/extensions/groups/members/{member_id}");
        app.server
            .delete(&path)
            .add_header(AUTHORIZATION, EDITOR)
            .await
            .assert_status_ok();

        let members: Value = app
            .server
            .get(&format!("{COLORS}/extensions/groups/members"))
            .await
            .json();
        assert_eq!(members.as_array().map(Vec::len), Some(1));

        app.server
            .delete(&path)
            .add_header(AUTHORIZATION, EDITOR)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_member_for_unknown_code_is_not_acceptable() {
        let app = create_seeded_app(&["red"]).await;
        app.server
            .post(&format!("{COLORS}/extensions"))
            .add_header(AUTHORIZATION, EDITOR)
            .json(&hierarchy_extension())
            .await
            .assert_status_ok();

        app.server
            .post(&format!("{COLORS}/extensions/groups/members"))
            .add_header(AUTHORIZATION, EDITOR)
            .json(&json!([{ "code": { "codeValue": "purple" } }]))
            .await
            .assert_status(StatusCode::NOT_ACCEPTABLE);
    }
}
