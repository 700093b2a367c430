//! OAuth2 Authorization Code flow with PKCE, as a persisted state machine.
//!
//! [`PkceFlow`] never holds flow state in memory between steps. Each
//! transition is written through the [`TokenCache`] before the next side
//! effect, so a flow started by one process (or page load) can be finished
//! by another.
//!
//! ```text
//! start_login()              handle_redirect()                exchange_code_for_tokens()
//! Idle ──► AwaitingRedirect ──────────────► CodeReceived ──► Exchanging ──► Authenticated
//!                                    │                                 └──► Failed
//!                                    └── valid token cached ──────────────► Authenticated
//! ```
//!
//! No step is retried. A failed exchange leaves the flow in
//! [`FlowState::Failed`] until the next [`PkceFlow::start_login`].

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use super::browser::{Browser, BrowserError};
use super::pkce::{PkcePair, CODE_CHALLENGE_METHOD};
use super::session::SessionError;
use super::token_cache::{FlowState, PendingAuth, TokenCache, TokenSet};
use crate::config::{ConfigError, OAuthConfig};

/// Query parameters removed from the address once the redirect is read.
const CALLBACK_PARAMS: &[&str] = &["code", "state", "error", "error_description", "error_uri"];

/// Identity-provider endpoints and client registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Hosted UI base URL, without trailing slash.
    pub domain: String,
    /// Public app client id.
    pub client_id: String,
    /// Registered redirect URI. Sent on both authorize and token requests.
    pub redirect_uri: String,
    /// Where the provider sends the browser after logout.
    pub logout_uri: String,
    /// Space-separated scopes.
    pub scopes: String,
}

impl ProviderSettings {
    /// Resolves settings from configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] if the domain or client id is not set.
    pub fn from_config(config: &OAuthConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            domain: config.require_domain()?.to_string(),
            client_id: config.require_client_id()?.to_string(),
            redirect_uri: config.redirect_uri.clone(),
            logout_uri: config.effective_logout_uri(),
            scopes: config.scopes.clone(),
        })
    }

    /// `{domain}/oauth2/token`
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/token", self.domain)
    }

    /// The authorize URL for `challenge`.
    ///
    /// # Errors
    ///
    /// [`url::ParseError`] if the domain is not a URL.
    pub fn authorization_url(&self, challenge: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}/oauth2/authorize?client_id={}&response_type=code&scope={}&redirect_uri={}&code_challenge={}&code_challenge_method={}",
            self.domain,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.scopes),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(challenge),
            CODE_CHALLENGE_METHOD,
        ))
    }

    /// `{domain}/logout?client_id=…&logout_uri=…`
    ///
    /// # Errors
    ///
    /// [`url::ParseError`] if the domain is not a URL.
    pub fn logout_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}/logout?client_id={}&logout_uri={}",
            self.domain,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.logout_uri),
        ))
    }
}

/// OAuth error object, from a token endpoint body or an error redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    /// Error code (e.g. `invalid_grant`, `access_denied`).
    pub error: String,

    /// Human-readable error description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// URI for more information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl ProviderError {
    /// The provider's own wording: `error_description`, else `error`.
    pub fn message(&self) -> &str {
        self.error_description.as_deref().unwrap_or(&self.error)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(ref desc) = self.error_description {
            write!(f, ": {}", desc)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderError {}

/// Errors from the PKCE flow.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Exchange attempted with no pending login.
    #[error("no code verifier is pending; start a new login")]
    MissingVerifier,

    /// The provider reported an error (redirect or token endpoint).
    #[error("identity provider error: {0}")]
    Provider(ProviderError),

    /// The token endpoint answered a non-success status without an OAuth
    /// error body.
    #[error("token endpoint returned {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body as text.
        body: String,
    },

    /// The token endpoint answered success with an unusable body.
    #[error("malformed token response: {0}")]
    MalformedTokenResponse(String),

    /// The token request did not complete.
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A configured endpoint is not a valid URL.
    #[error("invalid provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The session store failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The browser could not be driven.
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl FlowError {
    /// Text recorded in [`FlowState::Failed`].
    fn reason(&self) -> String {
        match self {
            Self::Provider(e) => e.message().to_string(),
            other => other.to_string(),
        }
    }
}

/// What the current address says about the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Callback {
    Code(String),
    /// A `code` key with an empty value.
    EmptyCode,
    Error(ProviderError),
}

fn read_callback(url: &Url) -> Option<Callback> {
    let mut code = None;
    let mut error = None;
    let mut description = None;
    let mut error_uri = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            "error_uri" => error_uri = Some(value.into_owned()),
            _ => {},
        }
    }
    match (error, code) {
        (Some(error), _) => Some(Callback::Error(ProviderError {
            error,
            error_description: description,
            error_uri,
        })),
        (None, Some(code)) if code.is_empty() => Some(Callback::EmptyCode),
        (None, Some(code)) => Some(Callback::Code(code)),
        (None, None) => None,
    }
}

/// `url` without the callback parameters.
fn strip_callback_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !CALLBACK_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut clean = url.clone();
    if kept.is_empty() {
        clean.set_query(None);
    } else {
        clean.query_pairs_mut().clear().extend_pairs(kept);
    }
    clean
}

/// PKCE flow controller.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use pkce_tasks::client::browser::SystemBrowser;
/// use pkce_tasks::client::flow::{PkceFlow, ProviderSettings};
/// use pkce_tasks::client::session::FileSessionStore;
/// use pkce_tasks::client::token_cache::TokenCache;
///
/// # async fn example(settings: ProviderSettings) -> Result<(), Box<dyn std::error::Error>> {
/// let cache = TokenCache::new(Arc::new(FileSessionStore::default_location()?));
/// let flow = PkceFlow::new(settings, cache, Arc::new(SystemBrowser::new()));
/// flow.start_login()?;
/// // ... the provider redirects back; then, possibly in another process:
/// flow.handle_redirect().await?;
/// # Ok(())
/// # }
/// ```
pub struct PkceFlow {
    settings: ProviderSettings,
    cache: TokenCache,
    browser: Arc<dyn Browser>,
    http: reqwest::Client,
}

impl fmt::Debug for PkceFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceFlow")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl PkceFlow {
    /// Creates a flow controller.
    pub fn new(settings: ProviderSettings, cache: TokenCache, browser: Arc<dyn Browser>) -> Self {
        Self {
            settings,
            cache,
            browser,
            http: reqwest::Client::new(),
        }
    }

    /// Uses `client` for token requests.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Provider settings in use.
    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// The token cache this flow writes to.
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Persisted flow state.
    ///
    /// # Errors
    ///
    /// Propagates [`SessionError`].
    pub fn state(&self) -> Result<FlowState, FlowError> {
        Ok(self.cache.flow_state()?)
    }

    fn transition(&self, state: FlowState) -> Result<(), FlowError> {
        tracing::debug!(state = %state, "pkce flow transition");
        self.cache.set_flow_state(&state)?;
        Ok(())
    }

    fn fail(&self, err: FlowError) -> FlowError {
        let reason = err.reason();
        tracing::warn!(%reason, "pkce flow failed");
        match self.transition(FlowState::Failed {
            reason: reason.clone(),
        }) {
            Ok(()) => err,
            Err(persist) => {
                tracing::warn!(%reason, error = %persist, "failed to record flow failure");
                persist
            },
        }
    }

    /// `Idle → AwaitingRedirect`.
    ///
    /// Generates a verifier, persists it as the single pending login
    /// (replacing any earlier one), and sends the browser to the authorize
    /// endpoint. Returns the authorize URL.
    ///
    /// # Errors
    ///
    /// [`FlowError::Session`], [`FlowError::InvalidUrl`] or
    /// [`FlowError::Browser`].
    pub fn start_login(&self) -> Result<Url, FlowError> {
        let pair = PkcePair::generate();
        let url = self.settings.authorization_url(&pair.challenge)?;

        self.cache.set_pending(&PendingAuth {
            code_verifier: pair.verifier,
            started_at: Utc::now(),
        })?;
        self.transition(FlowState::AwaitingRedirect)?;

        tracing::info!("starting login");
        self.browser.redirect(&url)?;
        Ok(url)
    }

    /// Processes the provider's redirect, if the current address is one.
    ///
    /// The callback parameters are stripped from the visible address
    /// before anything else happens, whatever the outcome. Then:
    ///
    /// - an `error` redirect fails the flow with the provider's description;
    /// - a `code` with a valid token already cached goes straight to
    ///   `Authenticated`, without an exchange;
    /// - otherwise the code is exchanged.
    ///
    /// Returns `Ok(None)` when the address carries no callback, or only an
    /// empty `code` (which is still stripped).
    ///
    /// # Errors
    ///
    /// Any [`FlowError`] from the exchange, or [`FlowError::Provider`] for an
    /// error redirect.
    pub async fn handle_redirect(&self) -> Result<Option<TokenSet>, FlowError> {
        let Some(current) = self.browser.current_url() else {
            return Ok(None);
        };
        let Some(callback) = read_callback(&current) else {
            return Ok(None);
        };
        self.browser.replace_url(&strip_callback_params(&current));

        match callback {
            Callback::EmptyCode => {
                tracing::debug!("callback carried an empty code; nothing to exchange");
                Ok(None)
            },
            Callback::Error(provider) => {
                self.cache.take_pending()?;
                Err(self.fail(FlowError::Provider(provider)))
            },
            Callback::Code(code) => {
                if self.cache.has_valid_access_token()? {
                    tracing::debug!("valid token already cached; skipping exchange");
                    self.cache.take_pending()?;
                    self.transition(FlowState::Authenticated)?;
                    return Ok(self.cache.tokens()?);
                }
                self.transition(FlowState::CodeReceived)?;
                self.exchange_code_for_tokens(&code).await.map(Some)
            },
        }
    }

    /// `CodeReceived → Exchanging → Authenticated | Failed`.
    ///
    /// Consumes the pending verifier whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`FlowError::MissingVerifier`] if no login is pending.
    /// - [`FlowError::Provider`] or [`FlowError::Http`] on a non-success
    ///   status.
    /// - [`FlowError::MalformedTokenResponse`] on an unusable success body.
    /// - [`FlowError::Transport`] if the request does not complete.
    pub async fn exchange_code_for_tokens(&self, code: &str) -> Result<TokenSet, FlowError> {
        let Some(pending) = self.cache.take_pending()? else {
            return Err(self.fail(FlowError::MissingVerifier));
        };
        self.transition(FlowState::Exchanging)?;

        match self.request_tokens(code, &pending.code_verifier).await {
            Ok(tokens) => {
                let tokens = self.cache.store_tokens(tokens)?;
                self.transition(FlowState::Authenticated)?;
                tracing::info!(expires_in = ?tokens.expires_in, "login complete");
                Ok(tokens)
            },
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn request_tokens(&self, code: &str, verifier: &str) -> Result<TokenSet, FlowError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.settings.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("code_verifier", verifier),
        ];

        let response = self
            .http
            .post(self.settings.token_endpoint())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ProviderError>(&body) {
                Ok(provider) => FlowError::Provider(provider),
                Err(_) => FlowError::Http {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let tokens: TokenSet = serde_json::from_str(&body)
            .map_err(|e| FlowError::MalformedTokenResponse(e.to_string()))?;
        if tokens.access_token.is_empty() {
            return Err(FlowError::MalformedTokenResponse(
                "empty access_token".to_string(),
            ));
        }
        Ok(tokens)
    }

    /// `Authenticated → Idle`.
    ///
    /// Clears the session and sends the browser to the provider's logout
    /// endpoint. No token is revoked. Returns the logout URL.
    ///
    /// # Errors
    ///
    /// [`FlowError::Session`], [`FlowError::InvalidUrl`] or
    /// [`FlowError::Browser`].
    pub fn logout(&self) -> Result<Url, FlowError> {
        let url = self.settings.logout_url()?;
        self.cache.clear()?;
        tracing::info!("logged out");
        self.browser.redirect(&url)?;
        Ok(url)
    }

    /// Picks the flow up after a restart.
    ///
    /// If the current address carries a callback it is processed; errors
    /// from that are recorded in the returned state rather than returned.
    ///
    /// # Errors
    ///
    /// Only [`FlowError::Session`].
    pub async fn resume(&self) -> Result<FlowState, FlowError> {
        match self.handle_redirect().await {
            Ok(_) => {},
            Err(FlowError::Session(e)) => return Err(FlowError::Session(e)),
            Err(e) => tracing::debug!(error = %e, "redirect on resume failed"),
        }
        self.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::browser::MemoryBrowser;
    use crate::client::session::{MemorySessionStore, SessionStore};
    use pretty_assertions::assert_eq;

    fn settings() -> ProviderSettings {
        ProviderSettings {
            domain: "https://auth.example.com".to_string(),
            client_id: "client 1".to_string(),
            redirect_uri: "http://localhost:5173".to_string(),
            logout_uri: "http://localhost:5173".to_string(),
            scopes: "openid email".to_string(),
        }
    }

    #[test]
    fn authorization_url_carries_every_param() {
        let url = settings().authorization_url("chal").unwrap();
        assert_eq!(url.path(), "/oauth2/authorize");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let expect = |k: &str, v: &str| (k.to_string(), v.to_string());
        assert_eq!(
            pairs,
            vec![
                expect("client_id", "client 1"),
                expect("response_type", "code"),
                expect("scope", "openid email"),
                expect("redirect_uri", "http://localhost:5173"),
                expect("code_challenge", "chal"),
                expect("code_challenge_method", "S256"),
            ]
        );
    }

    #[test]
    fn logout_url_shape() {
        let url = settings().logout_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://auth.example.com/logout?client_id=client%201&logout_uri=http%3A%2F%2Flocalhost%3A5173"
        );
    }

    #[test]
    fn strip_keeps_unrelated_params() {
        let url = Url::parse("http://localhost:5173/app?tab=2&code=abc&state=s").unwrap();
        assert_eq!(
            strip_callback_params(&url).as_str(),
            "http://localhost:5173/app?tab=2"
        );
        let url = Url::parse("http://localhost:5173/?code=abc").unwrap();
        assert_eq!(strip_callback_params(&url).as_str(), "http://localhost:5173/");
    }

    #[test]
    fn read_callback_variants() {
        let parse = |s: &str| read_callback(&Url::parse(s).unwrap());
        assert_eq!(
            parse("http://x/?code=abc"),
            Some(Callback::Code("abc".to_string()))
        );
        assert_eq!(parse("http://x/?code="), Some(Callback::EmptyCode));
        assert_eq!(parse("http://x/?state=s"), None);
        assert_eq!(parse("http://x/"), None);
        let Some(Callback::Error(e)) =
            parse("http://x/?error=access_denied&error_description=User+said+no&code=abc")
        else {
            panic!("expected an error callback");
        };
        assert_eq!(e.message(), "User said no");
        assert_eq!(e.to_string(), "access_denied: User said no");
    }

    /// Session storage that refuses to write the flow state.
    struct FlowStateReadOnly(MemorySessionStore);

    impl SessionStore for FlowStateReadOnly {
        fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
            if key.ends_with("flow_state") {
                return Err(SessionError::Io {
                    path: "session.json".into(),
                    source: std::io::Error::other("read-only"),
                });
            }
            self.0.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), SessionError> {
            self.0.remove(key)
        }

        fn clear(&self) -> Result<(), SessionError> {
            self.0.clear()
        }
    }

    #[tokio::test]
    async fn unrecordable_failure_returns_session_error() {
        let cache = TokenCache::new(Arc::new(FlowStateReadOnly(MemorySessionStore::new())));
        cache
            .set_pending(&PendingAuth {
                code_verifier: "v".to_string(),
                started_at: Utc::now(),
            })
            .unwrap();
        let browser = Arc::new(MemoryBrowser::at(
            "http://localhost:5173/?error=access_denied&error_description=nope",
        ));
        let flow = PkceFlow::new(settings(), cache.clone(), browser.clone());

        let err = flow.handle_redirect().await.unwrap_err();
        assert!(matches!(err, FlowError::Session(SessionError::Io { .. })));
        assert!(cache.pending().unwrap().is_none());
        assert_eq!(
            browser.current_url().unwrap().as_str(),
            "http://localhost:5173/"
        );
    }

    #[test]
    fn provider_message_falls_back_to_code() {
        let e = ProviderError {
            error: "invalid_grant".to_string(),
            error_description: None,
            error_uri: None,
        };
        assert_eq!(e.message(), "invalid_grant");
        assert_eq!(FlowError::Provider(e).reason(), "invalid_grant");
    }
}
