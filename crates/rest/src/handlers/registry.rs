//! Registry and scheme upsert handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use codelist_persistence::CodeListStore;
use codelist_persistence::model::{RegistryInput, SchemeInput};
use tracing::debug;

use super::bind_code_value;
use crate::error::RestResult;
use crate::extractors::Caller;
use crate::state::AppState;

/// Creates or updates a registry. Superuser only.
///
/// `PUT [base]/coderegistries/{registry}`
pub async fn upsert_registry_handler<S>(
    State(state): State<AppState<S>>,
    Path(registry): Path<String>,
    caller: Caller,
    Json(mut input): Json<RegistryInput>,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    debug!(registry = %registry, "Processing registry upsert");
    bind_code_value(&mut input.code_value, &registry, "code registry")?;

    let result = state
        .service()
        .upsert_registry(caller.policy(), input)
        .await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

/// Creates or updates a scheme.
///
/// `PUT [base]/coderegistries/{registry}/codeschemes/{scheme}`
pub async fn upsert_scheme_handler<S>(
    State(state): State<AppState<S>>,
    Path((registry, scheme)): Path<(String, String)>,
    caller: Caller,
    Json(mut input): Json<SchemeInput>,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    debug!(registry = %registry, scheme = %scheme, "Processing scheme upsert");
    bind_code_value(&mut input.code_value, &scheme, "code scheme")?;

    let result = state
        .service()
        .upsert_scheme(caller.policy(), &registry, input)
        .await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}
