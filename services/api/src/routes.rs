//! API service routes

mod availability;
mod bookings;
mod cohosts;
mod contracts;
mod properties;
mod regulations;
mod reviews;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::json;
use tracing::error;

use crate::{middleware::auth_middleware, state::AppState};

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/properties",
            post(properties::create_property).get(properties::list_properties),
        )
        .route(
            "/properties/:id",
            get(properties::get_property).patch(properties::update_property),
        )
        .route("/host/properties", get(properties::host_properties))
        .route("/properties/:id/reviews", get(properties::property_reviews))
        .route(
            "/properties/:id/availability",
            get(availability::list_blocks).post(availability::add_block),
        )
        .route(
            "/properties/:id/availability/check",
            get(availability::check_range),
        )
        .route("/availability/:id", delete(availability::remove_block))
        .route(
            "/properties/:id/cohosts",
            get(cohosts::list_cohosts).post(cohosts::create_cohost),
        )
        .route(
            "/properties/:id/cohosts/:cohost_id",
            get(cohosts::get_cohost)
                .put(cohosts::update_cohost)
                .delete(cohosts::remove_cohost),
        )
        .route(
            "/properties/:id/permissions/:capability",
            get(cohosts::check_permission),
        )
        .route("/cohosts/my-properties", get(cohosts::my_properties))
        .route(
            "/bookings",
            post(bookings::create_booking).get(bookings::list_bookings),
        )
        .route("/properties/:id/bookings", get(bookings::property_bookings))
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/bookings/:id/payment", post(bookings::start_payment))
        .route(
            "/bookings/:id/payment/confirm",
            post(bookings::confirm_payment),
        )
        .route("/reviews", post(reviews::create_review))
        .route("/users/:id/reviews", get(reviews::guest_reviews))
        .route(
            "/contracts",
            post(contracts::create_contract).get(contracts::list_contracts),
        )
        .route("/contracts/:id", get(contracts::get_contract))
        .route("/contracts/:id/send", post(contracts::send_contract))
        .route("/contracts/:id/remind", post(contracts::remind_contract))
        .route("/contracts/:id/sign", post(contracts::sign_contract))
        .route(
            "/regulations",
            post(regulations::create_regulation).get(regulations::list_regulations),
        )
        .route(
            "/regulations/:id",
            get(regulations::get_regulation).patch(regulations::update_regulation),
        )
        .route("/regulations/:id/send", post(regulations::send_regulation))
        .route(
            "/regulations/:id/recipients",
            get(regulations::list_recipients),
        )
        .route(
            "/regulation-recipients",
            get(regulations::received_regulations),
        )
        .route(
            "/regulation-recipients/:id",
            get(regulations::get_recipient),
        )
        .route(
            "/regulation-recipients/:id/view",
            post(regulations::view_regulation),
        )
        .route(
            "/regulation-recipients/:id/acknowledge",
            post(regulations::acknowledge_regulation),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/payments/webhook", post(bookings::payment_webhook))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage = match state.stays.store.health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            error!("Storage health check failed: {}", e);
            false
        }
    };

    let status = if storage {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if storage { "ok" } else { "degraded" },
            "service": "stays-api",
            "storage": storage,
        })),
    )
}
