//! Application state shared across handlers

use stays::Stays;

use crate::middleware::JwtVerifier;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub stays: Stays,
    pub jwt: JwtVerifier,
}
