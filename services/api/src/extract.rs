//! Request extractors whose rejections use the API error body

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::ApiError;

/// JSON body; decoding failures answer 400 with the offending field
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Path parameters; malformed ids answer 400
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Query string; missing or malformed parameters answer 400
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
