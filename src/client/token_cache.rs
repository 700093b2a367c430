//! Credential state of the client, kept in a [`SessionStore`].
//!
//! Three values live in the session, each under its own key:
//!
//! - the [`TokenSet`] from the last successful exchange;
//! - the [`PendingAuth`] of the login in progress, at most one;
//! - the [`FlowState`] of the PKCE state machine.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::session::{SessionError, SessionStore};

const TOKENS_KEY: &str = "pkce_tasks.tokens";
const PENDING_KEY: &str = "pkce_tasks.pending";
const FLOW_STATE_KEY: &str = "pkce_tasks.flow_state";

/// Tokens returned by the provider's token endpoint.
///
/// Field names follow the token endpoint's JSON response.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer credential for the task API.
    pub access_token: String,

    /// OpenID Connect identity token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Refresh token. Stored but never used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Lifetime of `access_token` in seconds from `obtained_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Usually `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// When the set was stored. Filled in by [`TokenCache::store_tokens`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obtained_at: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

// Tokens stay out of logs.
impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

impl TokenSet {
    /// A token set carrying only an access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            id_token: None,
            refresh_token: None,
            expires_in: None,
            token_type: default_token_type(),
            obtained_at: None,
        }
    }

    /// Instant after which `access_token` is no longer valid, if known.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let obtained = self.obtained_at?;
        let secs = i64::try_from(self.expires_in?).ok()?;
        obtained.checked_add_signed(Duration::seconds(secs))
    }

    /// `true` if `access_token` is non-empty and not past its expiry at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expires_at().is_none_or(|exp| now < exp)
    }

    /// `Authorization` header value.
    pub fn to_header_value(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// The login in progress.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuth {
    /// PKCE code verifier bound to the outstanding authorize request.
    pub code_verifier: String,
    /// When the login started.
    pub started_at: DateTime<Utc>,
}

impl fmt::Debug for PendingAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAuth")
            .field("code_verifier", &"<redacted>")
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// State of the PKCE flow.
///
/// ```text
/// Idle ──start_login──► AwaitingRedirect ──redirect──► CodeReceived
///   ▲                                                       │
///   │ logout                                                ▼
/// Authenticated ◄──────────── ok ─────────────────────── Exchanging
///                                                           │ error
///                                                           ▼
///                                                         Failed
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlowState {
    /// No login in progress, not authenticated.
    #[default]
    Idle,
    /// The browser was sent to the authorize endpoint.
    AwaitingRedirect,
    /// The redirect carried a code; exchange not started.
    CodeReceived,
    /// Token request in flight.
    Exchanging,
    /// A token set is cached.
    Authenticated,
    /// The last attempt failed. Terminal until the next `start_login`.
    Failed {
        /// Provider or transport error description.
        reason: String,
    },
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::AwaitingRedirect => f.write_str("awaiting redirect"),
            Self::CodeReceived => f.write_str("code received"),
            Self::Exchanging => f.write_str("exchanging"),
            Self::Authenticated => f.write_str("authenticated"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Typed view over the credential keys of a [`SessionStore`].
///
/// Cloning shares the underlying store.
#[derive(Clone)]
pub struct TokenCache {
    session: Arc<dyn SessionStore>,
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache").finish_non_exhaustive()
    }
}

impl TokenCache {
    /// Wraps `session`.
    pub fn new(session: Arc<dyn SessionStore>) -> Self {
        Self { session }
    }

    fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        match self.session.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SessionError> {
        self.session.set(key, &serde_json::to_string(value)?)
    }

    /// The cached token set, if any.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError`].
    pub fn tokens(&self) -> Result<Option<TokenSet>, SessionError> {
        self.read(TOKENS_KEY)
    }

    /// Caches `tokens`, stamping `obtained_at` if unset.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError`].
    pub fn store_tokens(&self, mut tokens: TokenSet) -> Result<TokenSet, SessionError> {
        tokens.obtained_at.get_or_insert_with(Utc::now);
        self.write(TOKENS_KEY, &tokens)?;
        Ok(tokens)
    }

    /// `true` if a cached access token exists and has not expired.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError`].
    pub fn has_valid_access_token(&self) -> Result<bool, SessionError> {
        Ok(self
            .tokens()?
            .is_some_and(|t| t.is_valid_at(Utc::now())))
    }

    /// The login in progress, if any.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError`].
    pub fn pending(&self) -> Result<Option<PendingAuth>, SessionError> {
        self.read(PENDING_KEY)
    }

    /// Records a new login, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError`].
    pub fn set_pending(&self, pending: &PendingAuth) -> Result<(), SessionError> {
        self.write(PENDING_KEY, pending)
    }

    /// Removes and returns the login in progress.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError`].
    pub fn take_pending(&self) -> Result<Option<PendingAuth>, SessionError> {
        let pending = self.pending()?;
        self.session.remove(PENDING_KEY)?;
        Ok(pending)
    }

    /// Persisted flow state; [`FlowState::Idle`] if none was stored.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError`].
    pub fn flow_state(&self) -> Result<FlowState, SessionError> {
        Ok(self.read(FLOW_STATE_KEY)?.unwrap_or_default())
    }

    /// Persists `state`.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError`].
    pub fn set_flow_state(&self, state: &FlowState) -> Result<(), SessionError> {
        self.write(FLOW_STATE_KEY, state)
    }

    /// Removes tokens, pending login and flow state.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError`].
    pub fn clear(&self) -> Result<(), SessionError> {
        self.session.clear()
    }
}
