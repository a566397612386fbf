//! Property catalog routes

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use stays::{NewProperty, PropertyId, PropertyUpdate};

use crate::{
    error::ApiResult,
    extract::{ApiJson, ApiPath},
    middleware::AuthUser,
    state::AppState,
};

/// Create a listing owned by the caller
pub async fn create_property(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<NewProperty>,
) -> ApiResult<impl IntoResponse> {
    let property = state.stays.catalog.create_property(user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(property)))
}

pub async fn list_properties(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.catalog.properties().await?))
}

pub async fn get_property(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<PropertyId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.catalog.property(id).await?))
}

pub async fn update_property(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<PropertyId>,
    ApiJson(changes): ApiJson<PropertyUpdate>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state
            .stays
            .catalog
            .update_property(user.id, id, &changes)
            .await?,
    ))
}

/// Listings owned by the caller
pub async fn host_properties(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.catalog.host_properties(user.id).await?))
}

/// Reviews of a property with its aggregate rating
pub async fn property_reviews(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<PropertyId>,
) -> ApiResult<impl IntoResponse> {
    let reviews = state.stays.reviews.property_reviews(id).await?;
    let rating = state.stays.reviews.property_rating(id).await?;
    Ok(Json(json!({
        "rating": rating,
        "reviews": reviews,
    })))
}
