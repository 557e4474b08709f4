//! Health check endpoint handlers.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use codelist_persistence::{Backend, CodeListStore};
use tracing::{debug, warn};

use crate::error::RestResult;
use crate::state::AppState;

/// Handler for the health check endpoint.
///
/// # HTTP Request
///
/// `GET [base]/health`
pub async fn health_handler<S>(State(state): State<AppState<S>>) -> RestResult<Response>
where
    S: CodeListStore + Backend,
{
    debug!("Processing health check request");

    let health_response = serde_json::json!({
        "status": "healthy",
        "backend": state.service().store().name(),
        "index": state.service().indexer().client().client_name(),
        "reindexing": state.is_reindexing(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    });

    Ok((StatusCode::OK, Json(health_response)).into_response())
}

/// Liveness probe.
///
/// `GET [base]/_liveness`
pub async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe. Checks the database and the search engine.
///
/// # HTTP Request
///
/// `GET [base]/_readiness`
///
/// # Response
///
/// - `200 OK` - Both dependencies answer
/// - `503 Service Unavailable` - At least one does not
pub async fn readiness_handler<S>(State(state): State<AppState<S>>) -> RestResult<Response>
where
    S: CodeListStore + Backend,
{
    debug!("Processing readiness check request");

    let service = state.service();
    let storage = match service.store().health_check().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            warn!(error = %e, "Storage readiness check failed");
            e.to_string()
        }
    };

    let client = service.indexer().client();
    let registries_index = service.indexer().config().registries_index();
    let index_check = match client.health_check().await {
        Ok(()) => client.exists(&registries_index).await.map(|_| ()),
        Err(e) => Err(e),
    };
    let index = match index_check {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            warn!(error = %e, "Search index readiness check failed");
            e.to_string()
        }
    };

    let ready = storage == "ok" && index == "ok";
    let response = serde_json::json!({
        "status": if ready { "ready" } else { "unavailable" },
        "backend": service.store().name(),
        "checks": {
            "storage": storage,
            "index": index
        }
    });

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(response)).into_response())
}
