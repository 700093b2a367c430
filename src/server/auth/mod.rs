//! Server-side authentication.
//!
//! Handlers never parse headers or decode tokens: they take an [`Owner`]
//! argument, and the extractor runs the configured [`TokenValidator`] on
//! the request's `Authorization: Bearer <token>` header. Any failure is a
//! 401 before the handler body runs.
//!
//! ```text
//! Authorization header ──► bearer_token() ──► TokenValidator ──► AuthContext ──► Owner
//! ```

pub mod extract;
pub mod jwt;
pub mod traits;

pub use extract::Owner;
pub use jwt::UnverifiedJwtValidator;
pub use traits::{AuthContext, TokenValidator};

use crate::error::TaskError;

/// Reasons a request fails authentication.
///
/// None of these reach the client: every variant is answered with the same
/// `{"error":"Unauthorized"}` body and logged at `warn`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header.
    #[error("missing Authorization header")]
    MissingHeader,

    /// Header present but not `Bearer <token>`.
    #[error("Authorization header is not a Bearer credential")]
    InvalidScheme,

    /// Token is not decodable.
    #[error("malformed token: {reason}")]
    MalformedToken {
        /// What failed to decode.
        reason: String,
    },

    /// Token payload has no usable `sub` claim.
    #[error("token has no subject")]
    MissingSubject,
}

impl From<AuthError> for TaskError {
    fn from(err: AuthError) -> Self {
        Self::Unauthorized {
            reason: err.to_string(),
        }
    }
}

/// Extracts the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively and surrounding whitespace is
/// ignored.
///
/// # Errors
///
/// [`AuthError::MissingHeader`] for `None`, [`AuthError::InvalidScheme`]
/// for anything other than a non-empty `Bearer` credential.
///
/// # Examples
///
/// ```
/// use pkce_tasks::server::auth::{bearer_token, AuthError};
///
/// assert_eq!(bearer_token(Some("bearer abc")), Ok("abc"));
/// assert_eq!(bearer_token(Some("Basic abc")), Err(AuthError::InvalidScheme));
/// assert_eq!(bearer_token(None), Err(AuthError::MissingHeader));
/// ```
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingHeader)?.trim();
    let (scheme, token) = value.split_once(' ').ok_or(AuthError::InvalidScheme)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::InvalidScheme);
    }
    Ok(token)
}
