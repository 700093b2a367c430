//! Core authentication types.
//!
//! Handlers never see tokens. They see an [`AuthContext`], produced by a
//! [`TokenValidator`] from the bearer credential of the request.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Identity established for one request.
///
/// `subject` is the owner id for every store operation of the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Subject identifier (the `sub` claim). Never empty.
    pub subject: String,

    /// Every claim of the token payload, including `sub`.
    #[serde(default)]
    pub claims: HashMap<String, serde_json::Value>,

    /// Token expiration timestamp (Unix epoch seconds), if the token has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl AuthContext {
    /// Creates a context for `subject` with no other claims.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// The owner id (alias for `subject`).
    #[inline]
    pub fn owner_id(&self) -> &str {
        &self.subject
    }

    /// Get a typed claim value.
    ///
    /// ```rust
    /// use pkce_tasks::server::auth::AuthContext;
    ///
    /// let auth = AuthContext::new("user-123");
    /// let email: Option<String> = auth.claim("email");
    /// assert!(email.is_none());
    /// ```
    pub fn claim<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.claims
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// The `email` claim, if present.
    pub fn email(&self) -> Option<&str> {
        self.claims.get("email").and_then(|v| v.as_str())
    }
}

/// Turns a bearer token into an [`AuthContext`].
///
/// The router holds an `Arc<dyn TokenValidator>`, so a signature-verifying
/// implementation can replace [`UnverifiedJwtValidator`](super::UnverifiedJwtValidator)
/// without any handler change.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validates `token` (the part after `Bearer `).
    ///
    /// # Errors
    ///
    /// Any [`AuthError`]; the router answers 401 for all of them.
    async fn validate(&self, token: &str) -> Result<AuthContext, AuthError>;
}
