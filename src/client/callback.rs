//! Loopback listener that receives the provider's redirect.
//!
//! The CLI has no page for the provider to send the browser back to, so
//! `login` listens on the host and port of the registered redirect URI for
//! exactly one callback request, then stops.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::Html;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

const RECEIVED_PAGE: &str = "<!doctype html><html><head><title>pkce-tasks</title></head>\
<body><p>Login response received. You can close this window.</p></body></html>";

/// Errors from [`CallbackListener`].
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// The redirect URI has no host or port to listen on.
    #[error("redirect URI {0} cannot be served locally")]
    InvalidRedirectUri(String),

    /// The redirect address could not be bound.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        /// Address that was being bound.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No callback arrived in time.
    #[error("no login response within {0:?}")]
    Timeout(Duration),

    /// The listener stopped before a callback arrived.
    #[error("callback listener stopped unexpectedly")]
    Closed,
}

#[derive(Clone)]
struct CallbackState {
    base: Url,
    sender: Arc<Mutex<Option<oneshot::Sender<Url>>>>,
}

fn is_callback(uri: &Uri) -> bool {
    uri.query().is_some_and(|q| {
        url::form_urlencoded::parse(q.as_bytes()).any(|(k, _)| k == "code" || k == "error")
    })
}

async fn receive(State(state): State<CallbackState>, uri: Uri) -> (StatusCode, Html<&'static str>) {
    if !is_callback(&uri) {
        return (StatusCode::NOT_FOUND, Html("<!doctype html><p>Not found</p>"));
    }
    let mut url = state.base.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());

    if let Some(sender) = state.sender.lock().take() {
        // The receiver is gone only if the wait already timed out.
        let _ = sender.send(url);
    }
    (StatusCode::OK, Html(RECEIVED_PAGE))
}

/// A bound loopback listener waiting for one redirect.
///
/// Bind before opening the browser so the callback cannot arrive first.
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    base: Url,
}

impl CallbackListener {
    /// Binds the host and port of `redirect_uri`.
    ///
    /// # Errors
    ///
    /// [`CallbackError::InvalidRedirectUri`] or [`CallbackError::Bind`].
    pub async fn bind(redirect_uri: &str) -> Result<Self, CallbackError> {
        let base = Url::parse(redirect_uri)
            .map_err(|_| CallbackError::InvalidRedirectUri(redirect_uri.to_string()))?;
        let host = base
            .host_str()
            .ok_or_else(|| CallbackError::InvalidRedirectUri(redirect_uri.to_string()))?;
        let port = base
            .port_or_known_default()
            .ok_or_else(|| CallbackError::InvalidRedirectUri(redirect_uri.to_string()))?;

        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| CallbackError::Bind { addr, source })?;
        tracing::debug!(%base, "waiting for login callback");
        Ok(Self { listener, base })
    }

    /// Serves until one callback arrives or `timeout` elapses, and returns
    /// the full URL the browser was sent to.
    ///
    /// # Errors
    ///
    /// [`CallbackError::Timeout`] or [`CallbackError::Closed`].
    pub async fn wait(self, timeout: Duration) -> Result<Url, CallbackError> {
        let Self { listener, base } = self;
        let (tx, rx) = oneshot::channel();
        let state = CallbackState {
            base,
            sender: Arc::new(Mutex::new(Some(tx))),
        };
        let app = Router::new().fallback(receive).with_state(state);

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "callback listener failed");
            }
        });

        let result = tokio::time::timeout(timeout, rx).await;
        server.abort();
        match result {
            Ok(Ok(url)) => Ok(url),
            Ok(Err(_)) => Err(CallbackError::Closed),
            Err(_) => Err(CallbackError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_code_or_error_queries_are_callbacks() {
        assert!(is_callback(&Uri::from_static("/?code=abc")));
        assert!(is_callback(&Uri::from_static("/cb?error=access_denied")));
        assert!(!is_callback(&Uri::from_static("/favicon.ico")));
        assert!(!is_callback(&Uri::from_static("/?tab=1")));
    }

    #[tokio::test]
    async fn rejects_uri_without_host() {
        assert!(matches!(
            CallbackListener::bind("mailto:someone@example.com").await,
            Err(CallbackError::InvalidRedirectUri(_))
        ));
    }

    #[tokio::test]
    async fn receives_one_callback() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/").await.unwrap();
        let port = listener.listener.local_addr().unwrap().port();

        let waiter = tokio::spawn(listener.wait(Duration::from_secs(5)));
        let response = reqwest::get(format!("http://127.0.0.1:{port}/done?code=xyz&state=s"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let url = waiter.await.unwrap().unwrap();
        assert_eq!(url.path(), "/done");
        assert_eq!(url.query(), Some("code=xyz&state=s"));
    }

    #[tokio::test]
    async fn times_out_without_callback() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/").await.unwrap();
        assert!(matches!(
            listener.wait(Duration::from_millis(20)).await,
            Err(CallbackError::Timeout(_))
        ));
    }
}
