//! Rental contract routes

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use stays::{ContractId, NewContract, RemindContract, SendContract, SignContract};

use crate::{
    error::ApiResult,
    extract::{ApiJson, ApiPath},
    middleware::AuthUser,
    state::AppState,
};

pub async fn create_contract(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<NewContract>,
) -> ApiResult<impl IntoResponse> {
    let contract = state.stays.contracts.create_contract(user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

/// Contracts the caller created
pub async fn list_contracts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.contracts.contracts(user.id).await?))
}

pub async fn get_contract(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<ContractId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.stays.contracts.contract(user.id, id).await?))
}

pub async fn send_contract(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<ContractId>,
    ApiJson(payload): ApiJson<SendContract>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state
            .stays
            .contracts
            .send_contract(user.id, id, &payload)
            .await?,
    ))
}

pub async fn remind_contract(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<ContractId>,
    ApiJson(payload): ApiJson<RemindContract>,
) -> ApiResult<impl IntoResponse> {
    let reminder = state
        .stays
        .contracts
        .remind_contract(user.id, id, &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

pub async fn sign_contract(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiPath(id): ApiPath<ContractId>,
    ApiJson(payload): ApiJson<SignContract>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state
            .stays
            .contracts
            .sign_contract(user.id, id, &payload)
            .await?,
    ))
}
