//! Extension and member handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use codelist_persistence::CodeListStore;
use codelist_persistence::model::{ExtensionInput, MemberInput};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{RestError, RestResult};
use crate::extractors::Caller;
use crate::state::AppState;

/// Query parameters of an extension upsert.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionParams {
    /// Generate a member for every covered code without one.
    #[serde(default)]
    pub auto_create_members: bool,
}

/// Lists the extensions of a scheme.
///
/// `GET [base]/coderegistries/{registry}/codeschemes/{scheme}/extensions`
pub async fn list_extensions_handler<S>(
    State(state): State<AppState<S>>,
    Path((registry, scheme)): Path<(String, String)>,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    let extensions = state.service().list_extensions(&registry, &scheme).await?;
    Ok((StatusCode::OK, Json(extensions)).into_response())
}

/// Creates or updates an extension.
///
/// `POST [base]/coderegistries/{registry}/codeschemes/{scheme}/extensions?autoCreateMembers=true`
pub async fn upsert_extension_handler<S>(
    State(state): State<AppState<S>>,
    Path((registry, scheme)): Path<(String, String)>,
    Query(params): Query<ExtensionParams>,
    caller: Caller,
    Json(input): Json<ExtensionInput>,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    debug!(
        registry = %registry,
        scheme = %scheme,
        extension = %input.code_value,
        auto_create_members = params.auto_create_members,
        "Processing extension upsert"
    );
    let result = state
        .service()
        .upsert_extension(
            caller.policy(),
            &registry,
            &scheme,
            input,
            params.auto_create_members,
        )
        .await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

/// Lists the members of an extension.
///
/// `GET [base]/coderegistries/{registry}/codeschemes/{scheme}/extensions/{extension}/members`
pub async fn list_members_handler<S>(
    State(state): State<AppState<S>>,
    Path((registry, scheme, extension)): Path<(String, String, String)>,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    let members = state
        .service()
        .list_members(&registry, &scheme, &extension)
        .await?;
    Ok((StatusCode::OK, Json(members)).into_response())
}

/// Creates or updates a batch of members.
///
/// `POST [base]/coderegistries/{registry}/codeschemes/{scheme}/extensions/{extension}/members`
pub async fn upsert_members_handler<S>(
    State(state): State<AppState<S>>,
    Path((registry, scheme, extension)): Path<(String, String, String)>,
    caller: Caller,
    Json(inputs): Json<Vec<MemberInput>>,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    debug!(
        registry = %registry,
        scheme = %scheme,
        extension = %extension,
        count = inputs.len(),
        "Processing member upsert"
    );
    if inputs.is_empty() {
        return Err(RestError::bad_request("no members in request body"));
    }

    let result = state
        .service()
        .upsert_members(caller.policy(), &registry, &scheme, &extension, inputs)
        .await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}

/// Deletes a member.
///
/// `DELETE [base]/coderegistries/{registry}/codeschemes/{scheme}/extensions/{extension}/members/{member_id}`
pub async fn delete_member_handler<S>(
    State(state): State<AppState<S>>,
    Path((registry, scheme, extension, member_id)): Path<(String, String, String, Uuid)>,
    caller: Caller,
) -> RestResult<Response>
where
    S: CodeListStore,
{
    debug!(extension = %extension, member = %member_id, "Processing member delete");
    let result = state
        .service()
        .delete_member(caller.policy(), &registry, &scheme, &extension, member_id)
        .await?;
    Ok((StatusCode::OK, Json(result)).into_response())
}
