//! Code handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use codelist_persistence::model::CodeInput;
use codelist_persistence::{CodeListStore, Status};
use serde::Deserialize;
use tracing::debug;

use crate::error::{RestError, RestResult};
use crate::extractors::Caller;
use crate::state::AppState;

/// Body of a mass status change.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// Codes currently in this status are moved.
    pub initial_status: Status,
    /// Target status.
    pub end_status: Status,
}

/// Lists the codes of a scheme ordered by order.
///
/// `GET [base]/coderegistries/{registry}/codeschemes/{scheme}/codes`
pub async fn list_codes_handler<S>(
    State(state): State<AppState<S>>,
    Path((registry, scheme)): Path<(String, String)>,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    debug!(registry = %registry, scheme = %scheme, "Listing codes");
    let codes = state.service().list_codes(&registry, &scheme).await?;
    Ok((StatusCode::OK, Json(codes)).into_response())
}

/// Creates or updates a batch of codes.
///
/// The whole batch is validated before anything is written; one invalid code
/// rejects the batch with 406.
///
/// `POST [base]/coderegistries/{registry}/codeschemes/{scheme}/codes`
pub async fn upsert_codes_handler<S>(
    State(state): State<AppState<S>>,
    Path((registry, scheme)): Path<(String, String)>,
    caller: Caller,
    Json(inputs): Json<Vec<CodeInput>>,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    debug!(registry = %registry, scheme = %scheme, count = inputs.len(), "Processing code upsert");
    if inputs.is_empty() {
        return Err(RestError::bad_request("no codes in request body"));
    }

    let result = state
        .service()
        .upsert_codes(caller.policy(), &registry, &scheme, inputs)
        .await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

/// Deletes a code.
///
/// `DELETE [base]/coderegistries/{registry}/codeschemes/{scheme}/codes/{code}`
pub async fn delete_code_handler<S>(
    State(state): State<AppState<S>>,
    Path((registry, scheme, code)): Path<(String, String, String)>,
    caller: Caller,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    debug!(registry = %registry, scheme = %scheme, code = %code, "Processing code delete");
    let result = state
        .service()
        .delete_code(caller.policy(), &registry, &scheme, &code)
        .await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

/// Moves every code in one status to another.
///
/// `POST [base]/coderegistries/{registry}/codeschemes/{scheme}/codes/status`
pub async fn change_code_statuses_handler<S>(
    State(state): State<AppState<S>>,
    Path((registry, scheme)): Path<(String, String)>,
    caller: Caller,
    Json(change): Json<StatusChange>,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    debug!(
        registry = %registry,
        scheme = %scheme,
        from = %change.initial_status,
        to = %change.end_status,
        "Processing mass status change"
    );
    let result = state
        .service()
        .mass_change_statuses(
            caller.policy(),
            &registry,
            &scheme,
            change.initial_status,
            change.end_status,
        )
        .await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}
