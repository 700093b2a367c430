//! HTTP surface of the task API.
//!
//! | Method  | Path               | Handler                          |
//! |---------|--------------------|----------------------------------|
//! | GET     | `/tasks`           | [`handlers::list_tasks`]         |
//! | POST    | `/tasks`           | [`handlers::create_task`]        |
//! | PUT     | `/tasks/{task_id}` | [`handlers::update_task`]        |
//! | DELETE  | `/tasks/{task_id}` | [`handlers::delete_task`]        |
//! | OPTIONS | any                | [`response::preflight`]          |
//! | other   | any                | [`response::not_found`] (404)    |
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pkce_tasks::server::{serve, AppState};
//! use pkce_tasks::InMemoryTaskStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let state = AppState::new(Arc::new(InMemoryTaskStore::default()))
//!     .with_allowed_origin("https://tasks.example.com")?;
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! serve(listener, state, std::future::pending()).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod handlers;
pub mod response;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, put};
use axum::Router;
use http::header::InvalidHeaderValue;
use http::HeaderValue;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::info;

use crate::store::TaskStore;
use auth::{TokenValidator, UnverifiedJwtValidator};

/// Default `Access-Control-Allow-Origin`.
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";

/// Shared application state.
///
/// Cloned per request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Task record store.
    pub store: Arc<dyn TaskStore>,
    /// Bearer token validator.
    pub validator: Arc<dyn TokenValidator>,
    /// `Access-Control-Allow-Origin` value.
    pub allowed_origin: HeaderValue,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("allowed_origin", &self.allowed_origin)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// State over `store`, with the [`UnverifiedJwtValidator`] and
    /// [`DEFAULT_ALLOWED_ORIGIN`].
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            validator: Arc::new(UnverifiedJwtValidator::new()),
            allowed_origin: HeaderValue::from_static(DEFAULT_ALLOWED_ORIGIN),
        }
    }

    /// Replaces the token validator.
    pub fn with_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Sets the CORS origin.
    ///
    /// # Errors
    ///
    /// Fails if `origin` is not a valid header value.
    pub fn with_allowed_origin(mut self, origin: &str) -> Result<Self, InvalidHeaderValue> {
        self.allowed_origin = HeaderValue::from_str(origin)?;
        Ok(self)
    }
}

/// Logs every request line and its outcome.
async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    info!(%method, %path, "incoming request");
    let response = next.run(request).await;
    tracing::debug!(%method, %path, status = response.status().as_u16(), "request completed");
    response
}

/// Builds the task API router.
pub fn router(state: AppState) -> Router {
    let allowed_origin = state.allowed_origin.clone();

    let mut app = Router::new()
        .route(
            "/tasks",
            get(handlers::list_tasks)
                .post(handlers::create_task)
                .options(response::preflight),
        )
        .route(
            "/tasks/{task_id}",
            put(handlers::update_task)
                .delete(handlers::delete_task)
                .options(response::preflight),
        )
        .fallback(response::not_found)
        .method_not_allowed_fallback(response::not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(response::handle_panic))
        .layer(middleware::from_fn(log_request));

    for layer in response::header_layers(allowed_origin) {
        app = app.layer(layer);
    }
    app
}

/// Serves the router on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the listener's I/O error.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Task API listening on http://{}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
