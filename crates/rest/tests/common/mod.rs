//! Common test utilities for the code list API.
//!
//! Builds a [`TestServer`] over an in-memory SQLite store and an in-memory
//! search index, and seeds registry `jhs` with scheme `colors`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use codelist_persistence::backends::sqlite::SqliteBackend;
use codelist_persistence::model::{CodeInput, RegistryInput, SchemeInput};
use codelist_persistence::search::InMemoryIndexClient;
use codelist_persistence::{CodeListService, Superuser};
use codelist_rest::{AppState, ServerConfig};

pub const AUTHORIZATION: HeaderName = HeaderName::from_static("authorization");
pub const ADMIN: HeaderValue = HeaderValue::from_static("Bearer test-admin-token");
pub const EDITOR: HeaderValue = HeaderValue::from_static("Bearer test-editor-token");
pub const STRANGER: HeaderValue = HeaderValue::from_static("Bearer unknown-token");

pub const MAIN_INDEX: &str = "codelist_codelist";
pub const REGISTRIES_INDEX: &str = "codelist_registries";
pub const JHS_INDEX: &str = "codelist_registry_jhs";

pub const COLORS: &str = "/coderegistries/jhs/codeschemes/colors";

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState<SqliteBackend>,
    pub index: Arc<InMemoryIndexClient>,
}

/// Creates a test server without any content.
pub fn create_test_app() -> TestApp {
    let config = ServerConfig::for_testing();
    let store = Arc::new(SqliteBackend::in_memory().expect("Failed to create SQLite backend"));
    let index = Arc::new(InMemoryIndexClient::new());
    let service = CodeListService::new(store, index.clone(), config.service_config());

    let state = AppState::new(Arc::new(service), config);
    let app = codelist_rest::routing::create_routes(state.clone());
    let server = TestServer::new(app).expect("Failed to create test server");

    TestApp {
        server,
        state,
        index,
    }
}

/// Creates a test server with registry `jhs`, scheme `colors` and the given
/// codes at the root level.
pub async fn create_seeded_app(codes: &[&str]) -> TestApp {
    let app = create_test_app();
    let service = app.state.service();

    service
        .upsert_registry(
            &Superuser,
            RegistryInput {
                code_value: "jhs".to_string(),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to seed registry");
    service
        .upsert_scheme(
            &Superuser,
            "jhs",
            SchemeInput {
                code_value: "colors".to_string(),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to seed scheme");

    if !codes.is_empty() {
        service
            .upsert_codes(
                &Superuser,
                "jhs",
                "colors",
                codes.iter().map(|c| CodeInput::new(*c)).collect(),
            )
            .await
            .expect("Failed to seed codes");
    }

    app
}
