//! Claim extraction from JWT compact serialization.
//!
//! # Trust boundary
//!
//! [`UnverifiedJwtValidator`] decodes the payload segment and checks only the
//! token's *shape*: three dot-separated segments, a base64url JSON object
//! payload, and a non-empty string `sub`. It does **not** check the
//! signature, issuer, audience or expiry. Deploy it only behind a layer that
//! does (an API gateway JWT authorizer, for example), or put a verifying
//! [`TokenValidator`] in its place.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::traits::{AuthContext, TokenValidator};
use super::AuthError;

/// Decodes JWT claims without verifying the signature.
///
/// # Example
///
/// ```rust
/// use base64::engine::general_purpose::URL_SAFE_NO_PAD;
/// use base64::Engine;
/// use pkce_tasks::server::auth::UnverifiedJwtValidator;
///
/// let payload = URL_SAFE_NO_PAD.encode(r#"{"sub":"user-1","email":"a@b.c"}"#);
/// let token = format!("e30.{payload}.sig");
/// let auth = UnverifiedJwtValidator::new().decode(&token).unwrap();
/// assert_eq!(auth.owner_id(), "user-1");
/// assert_eq!(auth.email(), Some("a@b.c"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct UnverifiedJwtValidator;

impl UnverifiedJwtValidator {
    /// Creates the validator.
    pub fn new() -> Self {
        Self
    }

    /// Decodes `token` into an [`AuthContext`].
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedToken`] if the token is not three segments or
    ///   the payload is not base64url-encoded JSON object.
    /// - [`AuthError::MissingSubject`] if `sub` is absent, empty or not a
    ///   string.
    pub fn decode(&self, token: &str) -> Result<AuthContext, AuthError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [_, payload, _] = segments.as_slice() else {
            return Err(AuthError::MalformedToken {
                reason: format!("expected 3 segments, found {}", segments.len()),
            });
        };

        // Some issuers pad the payload; the engine rejects padding.
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| AuthError::MalformedToken {
                reason: format!("payload is not base64url: {e}"),
            })?;
        let claims: HashMap<String, serde_json::Value> =
            serde_json::from_slice(&bytes).map_err(|e| AuthError::MalformedToken {
                reason: format!("payload is not a JSON object: {e}"),
            })?;

        let subject = claims
            .get("sub")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSubject)?
            .to_string();
        let expires_at = claims.get("exp").and_then(serde_json::Value::as_u64);

        Ok(AuthContext {
            subject,
            claims,
            expires_at,
        })
    }
}

#[async_trait]
impl TokenValidator for UnverifiedJwtValidator {
    async fn validate(&self, token: &str) -> Result<AuthContext, AuthError> {
        self.decode(token)
    }
}
