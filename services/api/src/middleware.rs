//! Authentication middleware for JWT token validation

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use stays::UserId;
use tracing::debug;

use crate::{error::ApiError, state::AppState};

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: UserId,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
}

/// Authenticated caller, inserted into request extensions
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: UserId,
}

/// Verifies HS256 bearer tokens
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, ApiError> {
        let token_data =
            jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
                debug!("Rejected bearer token: {}", e);
                ApiError::Unauthorized
            })?;

        Ok(AuthUser {
            id: token_data.claims.sub,
        })
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ApiError::Unauthorized)?;
    let user = state.jwt.verify(bearer.token())?;

    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

#[cfg(test)]
pub mod testing {
    use super::Claims;
    use jsonwebtoken::{EncodingKey, Header};
    use stays::UserId;

    /// Signs a one-hour token for `user`.
    pub fn issue_token(secret: &str, user: UserId) -> String {
        let now = chrono::Utc::now().timestamp() as u64;
        let claims = Claims {
            sub: user,
            iat: now,
            exp: now + 3600,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testing::issue_token;

    #[test]
    fn valid_token_yields_user() {
        let user = UserId::new();
        let verifier = JwtVerifier::new("secret");
        let auth = verifier.verify(&issue_token("secret", user)).unwrap();
        assert_eq!(auth.id, user);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let verifier = JwtVerifier::new("secret");
        let token = issue_token("another-secret", UserId::new());
        assert!(matches!(
            verifier.verify(&token),
            Err(ApiError::Unauthorized)
        ));
    }
}
