//! Admin reindex handlers.
//!
//! Only superusers may reindex, and only one admin reindex runs at a time.
//! The work runs on its own task, so a request that times out does not
//! cancel a rebuild half-way; the slot stays claimed until the task ends.

use std::future::Future;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use codelist_persistence::CodeListStore;
use codelist_persistence::error::{IndexError, StorageResult};
use codelist_persistence::search::{DocumentType, ReindexReport};
use tracing::{debug, info, warn};

use crate::error::{RestError, RestResult};
use crate::extractors::Caller;
use crate::state::AppState;

/// Runs `work` on a spawned task while holding the reindex slot.
async fn run_exclusive<S, F>(state: &AppState<S>, label: String, work: F) -> RestResult<Response>
where
    S: CodeListStore,
    F: Future<Output = StorageResult<ReindexReport>> + Send + 'static,
{
    let permit = state.try_begin_reindex().ok_or_else(|| RestError::Conflict {
        message: "a reindex is already running".to_string(),
    })?;

    info!(target_index = %label, "Admin reindex started");
    let report = tokio::spawn(async move {
        let _permit = permit;
        work.await
    })
    .await
    .map_err(|e| RestError::InternalError {
        message: format!("reindex task failed: {}", e),
    })??;

    let status = if report.is_success() {
        info!(
            target_index = %label,
            documents = report.documents_written(),
            "Admin reindex finished"
        );
        StatusCode::OK
    } else {
        let failed: Vec<&str> = report.failed_runs().map(|run| run.index.as_str()).collect();
        warn!(target_index = %label, failed_indices = ?failed, "Admin reindex finished with failures");
        StatusCode::BAD_GATEWAY
    };

    Ok((status, Json(report)).into_response())
}

/// Rebuilds every index.
///
/// # HTTP Request
///
/// `POST [base]/admin/reindex`
///
/// # Response
///
/// - `200 OK` - Every run succeeded; body is the report
/// - `502 Bad Gateway` - At least one run failed; body is the report
/// - `401 Unauthorized` - Caller is not a superuser
/// - `409 Conflict` - Another reindex is running
pub async fn reindex_all_handler<S>(
    State(state): State<AppState<S>>,
    caller: Caller,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    debug!("Processing reindex request");
    caller.require_superuser()?;

    let indexer = state.service().indexer().clone();
    run_exclusive(&state, "all".to_string(), async move {
        indexer.reindex_everything().await
    })
    .await
}

/// Refreshes the documents of one scheme.
///
/// `POST [base]/admin/reindex/coderegistries/{registry}/codeschemes/{scheme}`
pub async fn reindex_scheme_handler<S>(
    State(state): State<AppState<S>>,
    Path((registry, scheme)): Path<(String, String)>,
    caller: Caller,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    debug!(registry = %registry, scheme = %scheme, "Processing scheme reindex request");
    caller.require_superuser()?;

    // Resolve first so a missing scheme is a 404 without claiming the slot.
    state.service().scheme(&registry, &scheme).await?;

    let indexer = state.service().indexer().clone();
    let label = format!("{}/{}", registry, scheme);
    run_exclusive(&state, label, async move {
        indexer.reindex_scheme(&registry, &scheme).await
    })
    .await
}

/// Replaces every document of one entity type.
///
/// `POST [base]/admin/reindex/types/{entity_type}`
///
/// Accepts singular or plural type names, e.g. `code` or `codes`. Unknown
/// names are a 400.
pub async fn reindex_type_handler<S>(
    State(state): State<AppState<S>>,
    Path(entity_type): Path<String>,
    caller: Caller,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    debug!(entity_type = %entity_type, "Processing type reindex request");
    caller.require_superuser()?;

    let document_type: DocumentType = entity_type
        .parse()
        .map_err(|e: IndexError| RestError::bad_request(e.to_string()))?;

    let indexer = state.service().indexer().clone();
    run_exclusive(&state, document_type.to_string(), async move {
        indexer.reindex_entity_type(document_type).await
    })
    .await
}
