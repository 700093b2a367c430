//! Axum extractor for the authenticated owner.

use axum::extract::FromRequestParts;
use http::header::AUTHORIZATION;
use http::request::Parts;

use super::bearer_token;
use super::traits::AuthContext;
use crate::error::TaskError;
use crate::server::AppState;

/// The caller's identity, taken from the bearer token and nothing else.
///
/// Any `ownerId` in a request body is ignored; store calls use
/// [`Owner::id`].
#[derive(Debug, Clone)]
pub struct Owner(pub AuthContext);

impl Owner {
    /// The owner id (token `sub`).
    pub fn id(&self) -> &str {
        self.0.owner_id()
    }
}

impl FromRequestParts<AppState> for Owner {
    type Rejection = TaskError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .map(|v| v.to_str().unwrap_or_default());

        let result = match bearer_token(header) {
            Ok(token) => state.validator.validate(token).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(auth) => Ok(Self(auth)),
            Err(e) => {
                tracing::warn!(
                    method = %parts.method,
                    path = %parts.uri.path(),
                    reason = %e,
                    "rejected unauthenticated request"
                );
                Err(e.into())
            },
        }
    }
}
