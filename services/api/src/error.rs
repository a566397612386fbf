//! Custom error types for the API service

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use stays::RentalError;
use thiserror::Error;
use tracing::error;

/// Custom error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or invalid bearer token
    #[error("Unauthorized")]
    Unauthorized,

    /// Request body, path or query could not be decoded
    #[error("Bad request: {message}")]
    BadRequest {
        message: String,
        field: Option<String>,
    },

    /// A domain rule refused the request
    #[error(transparent)]
    Rental(#[from] RentalError),

    /// A domain rule refused the request; reported as 400 whatever the rule
    #[error(transparent)]
    Rejected(RentalError),
}

impl ApiError {
    /// Reports every rule failure of `err` as a validation error.
    ///
    /// Storage faults keep their own status.
    pub fn rejected(err: RentalError) -> Self {
        match err {
            err @ (RentalError::Storage(_) | RentalError::Payment(_)) => ApiError::Rental(err),
            err => ApiError::Rejected(err),
        }
    }

    fn bad_request(message: String) -> Self {
        let field = offending_field(&message);
        ApiError::BadRequest { message, field }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest { .. } | ApiError::Rejected(_) => StatusCode::BAD_REQUEST,
            ApiError::Rental(err) => match err {
                RentalError::NotFound(_) => StatusCode::NOT_FOUND,
                RentalError::Forbidden(_) => StatusCode::FORBIDDEN,
                RentalError::DateConflict
                | RentalError::DatesBlocked
                | RentalError::Conflict(_)
                | RentalError::Duplicate
                | RentalError::RangeConflict => StatusCode::CONFLICT,
                RentalError::Payment(_) => StatusCode::BAD_GATEWAY,
                RentalError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                RentalError::InvalidRange
                | RentalError::InvalidInput { .. }
                | RentalError::CapacityExceeded { .. }
                | RentalError::InvalidState(_)
                | RentalError::TooEarly(_)
                | RentalError::InvalidAssignment => StatusCode::BAD_REQUEST,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, kind, field) = match &self {
            ApiError::Unauthorized => ("Unauthorized".to_string(), "unauthorized", None),
            ApiError::BadRequest { message, field } => {
                (message.clone(), "bad_request", field.clone())
            }
            ApiError::Rental(err @ RentalError::Storage(_)) => {
                error!("Storage failure: {}", err);
                ("Internal server error".to_string(), err.kind(), None)
            }
            ApiError::Rental(err) | ApiError::Rejected(err) => (
                err.to_string(),
                err.kind(),
                err.field().map(str::to_owned),
            ),
        };

        let body = Json(json!({
            "error": message,
            "kind": kind,
            "field": field,
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

/// Field named by a serde "missing field" or "unknown field" message
fn offending_field(message: &str) -> Option<String> {
    ["missing field `", "unknown field `"]
        .iter()
        .find_map(|marker| message.split(marker).nth(1))
        .and_then(|rest| rest.split('`').next())
        .map(str::to_owned)
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
