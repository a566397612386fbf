//! Regulatory document routes

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use stays::{
    NewRegulation, RecipientId, RegulationFilter, RegulationId, RegulationUpdate, SendRegulation,
};

use crate::{
    error::ApiResult,
    extract::{ApiJson, ApiPath, ApiQuery},
    middleware::AuthUser,
    state::AppState,
};

pub async fn create_regulation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<NewRegulation>,
) -> ApiResult<impl IntoResponse> {
    let regulation = state
        .stays
        .regulations
        .create_regulation(user.id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(regulation)))
}

/// Published regulations, optionally filtered by property, type or status
pub async fn list_regulations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiQuery(filter): ApiQuery<RegulationFilter>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state.stays.regulations.regulations(user.id, filter).await?,
    ))
}

pub async fn get_regulation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<RegulationId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.regulations.regulation(user.id, id).await?))
}

pub async fn update_regulation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<RegulationId>,
    ApiJson(changes): ApiJson<RegulationUpdate>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state
            .stays
            .regulations
            .update_regulation(user.id, id, &changes)
            .await?,
    ))
}

pub async fn send_regulation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<RegulationId>,
    ApiJson(payload): ApiJson<SendRegulation>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state
            .stays
            .regulations
            .send_regulation(user.id, id, &payload)
            .await?,
    ))
}

pub async fn list_recipients(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<RegulationId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.regulations.recipients(user.id, id).await?))
}

/// Regulations delivered to the caller
pub async fn received_regulations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.regulations.received(user.id).await?))
}

pub async fn get_recipient(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<RecipientId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.regulations.recipient(user.id, id).await?))
}

pub async fn view_regulation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<RecipientId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.regulations.mark_viewed(user.id, id).await?))
}

pub async fn acknowledge_regulation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<RecipientId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.regulations.acknowledge(user.id, id).await?))
}
