//! Review routes

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use stays::{ReviewRequest, UserId};

use crate::{
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath},
    middleware::AuthUser,
    state::AppState,
};

/// Review a finished stay; every refused rule answers 400 with its kind
pub async fn create_review(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(request): ApiJson<ReviewRequest>,
) -> ApiResult<impl IntoResponse> {
    let review = state
        .stays
        .reviews
        .create_review(user.id, &request)
        .await
        .map_err(ApiError::rejected)?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn guest_reviews(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.reviews.guest_reviews(id).await?))
}
