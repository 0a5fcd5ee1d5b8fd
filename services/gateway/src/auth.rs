//! Authentication boundary
//!
//! The core consumes an `AuthResolver`: a token goes in, an account id
//! comes out or the request is `Unauthorized`. The production resolver
//! verifies JWT bearer tokens; handlers receive the resolved identity
//! through the `AuthenticatedUser` extractor.

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use types::errors::OrderError;
use types::ids::AccountId;

/// Token verification boundary.
pub trait AuthResolver: Send + Sync {
    fn verify(&self, token: &str) -> Result<AccountId, AppError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub account_id: AccountId,
}

/// JWT-based resolver.
pub struct JwtAuthResolver {
    decoding_key: DecodingKey,
}

impl JwtAuthResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for an account (test and tooling helper).
    pub fn issue(secret: &str, account_id: AccountId, exp: usize) -> String {
        let claims = Claims {
            sub: account_id.to_string(),
            exp,
            account_id,
        };
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("claims serialize")
    }
}

impl AuthResolver for JwtAuthResolver {
    fn verify(&self, token: &str) -> Result<AccountId, AppError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| AppError::Order(OrderError::Unauthorized(format!("invalid token: {}", e))))?;
        Ok(data.claims.account_id)
    }
}

/// The authenticated caller of a request.
pub struct AuthenticatedUser {
    pub account_id: AccountId,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("Authorization")
            .ok_or_else(|| {
                AppError::Order(OrderError::Unauthorized(
                    "missing authentication credentials".into(),
                ))
            })?
            .to_str()
            .map_err(|_| AppError::Order(OrderError::Unauthorized("invalid header string".into())))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Order(OrderError::Unauthorized("expected bearer token".into()))
        })?;

        let account_id = state.auth.verify(token)?;
        Ok(AuthenticatedUser { account_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let account = AccountId::new();
        let token = JwtAuthResolver::issue("secret", account, usize::MAX);

        let resolver = JwtAuthResolver::new("secret");
        assert_eq!(resolver.verify(&token).unwrap(), account);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtAuthResolver::issue("secret", AccountId::new(), usize::MAX);
        let resolver = JwtAuthResolver::new("other-secret");
        assert!(resolver.verify(&token).is_err());
    }
}
