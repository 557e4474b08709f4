//! Code list route configuration.

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use codelist_persistence::{Backend, CodeListStore};

use crate::handlers;
use crate::state::AppState;

/// Creates all code list API routes.
///
/// # Routes
///
/// ## Probes
/// - `GET /health`, `GET /_liveness`, `GET /_readiness`
///
/// ## Admin (superuser)
/// - `POST /admin/reindex` - Rebuild every index
/// - `POST /admin/reindex/coderegistries/{registry}/codeschemes/{scheme}` - Refresh one scheme
/// - `POST /admin/reindex/types/{entity_type}` - Replace one entity type
///
/// ## Content
/// - `PUT /coderegistries/{registry}`
/// - `PUT /coderegistries/{registry}/codeschemes/{scheme}`
/// - `GET|POST .../codeschemes/{scheme}/codes`
/// - `POST .../codeschemes/{scheme}/codes/status`
/// - `DELETE .../codeschemes/{scheme}/codes/{code}`
/// - `GET|POST .../codeschemes/{scheme}/extensions`
/// - `GET|POST .../extensions/{extension}/members`
/// - `DELETE .../extensions/{extension}/members/{member_id}`
pub fn create_routes<S>(state: AppState<S>) -> Router
where
    S: CodeListStore + Backend,
{
    const SCHEME: &str = "/coderegistries/{registry}/codeschemes/{scheme}";

    Router::new()
        // Probes
        .route("/health", get(handlers::health_handler::<S>))
        .route("/_liveness", get(handlers::health::liveness_handler))
        .route("/_readiness", get(handlers::health::readiness_handler::<S>))
        // Admin
        .route("/admin/reindex", post(handlers::reindex_all_handler::<S>))
        .route(
            "/admin/reindex/coderegistries/{registry}/codeschemes/{scheme}",
            post(handlers::reindex_scheme_handler::<S>),
        )
        .route(
            "/admin/reindex/types/{entity_type}",
            post(handlers::reindex_type_handler::<S>),
        )
        // Registries and schemes
        .route(
            "/coderegistries/{registry}",
            put(handlers::upsert_registry_handler::<S>),
        )
        .route(SCHEME, put(handlers::upsert_scheme_handler::<S>))
        // Codes
        .route(
            &format!("{SCHEME}/codes"),
            get(handlers::list_codes_handler::<S>).post(handlers::upsert_codes_handler::<S>),
        )
        .route(
            &format!("{SCHEME}/codes/status"),
            post(handlers::change_code_statuses_handler::<S>),
        )
        .route(
            &format!("{SCHEME}/codes/{{code}}"),
            delete(handlers::delete_code_handler::<S>),
        )
        // Extensions and members
        .route(
            &format!("{SCHEME}/extensions"),
            get(handlers::list_extensions_handler::<S>)
                .post(handlers::upsert_extension_handler::<S>),
        )
        .route(
            &format!("{SCHEME}/extensions/{{extension}}/members"),
            get(handlers::list_members_handler::<S>).post(handlers::upsert_members_handler::<S>),
        )
        .route(
            &format!("{SCHEME}/extensions/{{extension}}/members/{{member_id}}"),
            delete(handlers::delete_member_handler::<S>),
        )
        .with_state(state)
}
