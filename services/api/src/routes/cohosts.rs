//! Co-host management routes

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use stays::{CoHostId, CoHostUpdate, NewCoHost, PropertyId};

use crate::{
    error::ApiResult,
    extract::{ApiJson, ApiPath},
    middleware::AuthUser,
    state::AppState,
};

pub async fn list_cohosts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(property): ApiPath<PropertyId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.cohosts.list_cohosts(user.id, property).await?))
}

pub async fn create_cohost(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(property): ApiPath<PropertyId>,
    ApiJson(payload): ApiJson<NewCoHost>,
) -> ApiResult<impl IntoResponse> {
    let cohost = state
        .stays
        .cohosts
        .create_cohost(user.id, property, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(cohost)))
}

pub async fn get_cohost(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((property, id)): ApiPath<(PropertyId, CoHostId)>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state.stays.cohosts.get_cohost(user.id, property, id).await?,
    ))
}

pub async fn update_cohost(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((property, id)): ApiPath<(PropertyId, CoHostId)>,
    ApiJson(changes): ApiJson<CoHostUpdate>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state
            .stays
            .cohosts
            .update_cohost(user.id, property, id, &changes)
            .await?,
    ))
}

pub async fn remove_cohost(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((property, id)): ApiPath<(PropertyId, CoHostId)>,
) -> ApiResult<impl IntoResponse> {
    state
        .stays
        .cohosts
        .remove_cohost(user.id, property, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Whether the caller holds `capability`; unknown names answer `false`
pub async fn check_permission(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath((property, capability)): ApiPath<(PropertyId, String)>,
) -> ApiResult<impl IntoResponse> {
    let allowed = state
        .stays
        .cohosts
        .authorize_named(user.id, property, &capability)
        .await?;
    Ok(Json(json!({
        "property_id": property,
        "capability": capability,
        "allowed": allowed,
    })))
}

/// Properties the caller co-hosts
pub async fn my_properties(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.cohosts.cohosted_properties(user.id).await?))
}
