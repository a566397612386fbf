//! Availability ledger routes

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use stays::{BlockId, NewBlock, PropertyId};

use crate::{
    error::ApiResult,
    extract::{ApiJson, ApiPath, ApiQuery},
    middleware::AuthUser,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

pub async fn list_blocks(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<PropertyId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.ledger.list_blocks(id).await?))
}

pub async fn add_block(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<PropertyId>,
    ApiJson(payload): ApiJson<NewBlock>,
) -> ApiResult<impl IntoResponse> {
    let block = state.stays.ledger.add_block(user.id, id, payload).await?;
    Ok((StatusCode::CREATED, Json(block)))
}

pub async fn check_range(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<PropertyId>,
    ApiQuery(range): ApiQuery<RangeQuery>,
) -> ApiResult<impl IntoResponse> {
    let blocked = state
        .stays
        .ledger
        .is_range_blocked(id, range.start, range.end)
        .await?;
    Ok(Json(json!({
        "property_id": id,
        "start": range.start,
        "end": range.end,
        "blocked": blocked,
    })))
}

pub async fn remove_block(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<BlockId>,
) -> ApiResult<impl IntoResponse> {
    state.stays.ledger.remove_block(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
