//! Booking and payment routes

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use stays::{BookingId, BookingRequest, PropertyId};
use tracing::info;

use crate::{
    error::ApiResult,
    extract::{ApiJson, ApiPath},
    middleware::AuthUser,
    state::AppState,
};

/// Gateway callback naming a session whose state changed
///
/// Any state the caller includes is ignored.
#[derive(Debug, Deserialize)]
pub struct PaymentNotice {
    pub session: String,
}

/// Book a stay for the caller
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(request): ApiJson<BookingRequest>,
) -> ApiResult<impl IntoResponse> {
    let booking = state.stays.bookings.create_booking(user.id, &request).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.bookings.bookings_for(user.id).await?))
}

pub async fn property_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(property): ApiPath<PropertyId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state
            .stays
            .bookings
            .property_bookings(user.id, property)
            .await?,
    ))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<BookingId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.bookings.booking(user.id, id).await?))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<BookingId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.bookings.cancel_booking(user.id, id).await?))
}

/// Open a checkout session for the caller's pending booking
pub async fn start_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<BookingId>,
) -> ApiResult<impl IntoResponse> {
    let session = state.stays.payments.start_payment(user.id, id).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Poll the gateway for the booking's session and apply its state
pub async fn confirm_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<BookingId>,
) -> ApiResult<impl IntoResponse> {
    // Visibility check before touching the gateway.
    state.stays.bookings.booking(user.id, id).await?;
    Ok(Json(state.stays.payments.reconcile(id).await?))
}

/// Gateway callback; not behind bearer auth, so the session state is read
/// back from the gateway
pub async fn payment_webhook(
    State(state): State<AppState>,
    ApiJson(notice): ApiJson<PaymentNotice>,
) -> ApiResult<impl IntoResponse> {
    info!("Payment notice for session {}", notice.session);
    let booking = state
        .stays
        .payments
        .handle_payment_notice(&notice.session)
        .await?;
    Ok(Json(booking))
}
