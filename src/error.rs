//! Error types for task API operations.
//!
//! [`TaskError`] is the single error type surfaced by the record store and
//! the HTTP handlers. Each variant maps to exactly one HTTP status via
//! [`TaskError::status_code`]; the JSON body is built in
//! [`server::response`](crate::server::response).

use http::StatusCode;

pub use crate::store::backend::StorageError;

/// Errors that can occur while serving a task request.
///
/// Validation variants (`InvalidStatus`, `InvalidTitle`, `NoUpdatableFields`,
/// `InvalidBody`) are always raised before any write reaches the backend.
///
/// # Examples
///
/// ```
/// use pkce_tasks::TaskError;
/// use http::StatusCode;
///
/// let err = TaskError::InvalidStatus { value: "bogus".to_string() };
/// assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
/// assert!(err.to_string().contains("bogus"));
///
/// let err = TaskError::Store("throughput exceeded".to_string());
/// assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
/// ```
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Missing, malformed or undecodable bearer token.
    #[error("unauthorized: {reason}")]
    Unauthorized {
        /// Why the token was rejected. Logged, never sent to the client.
        reason: String,
    },

    /// `status` outside of `todo | in-progress | done` on update.
    #[error("invalid status: {value}")]
    InvalidStatus {
        /// The rejected value.
        value: String,
    },

    /// Update carried a `title` that is empty or whitespace.
    #[error("title must not be empty")]
    InvalidTitle,

    /// Update carried none of `title`, `description`, `status`.
    #[error("no updatable fields provided")]
    NoUpdatableFields,

    /// Request body was not a JSON object of the expected shape.
    #[error("invalid request body: {details}")]
    InvalidBody {
        /// Parser message.
        details: String,
    },

    /// A path parameter could not be decoded (for example `/tasks/%FF`).
    #[error("invalid path parameter: {details}")]
    InvalidPath {
        /// Extractor message.
        details: String,
    },

    /// Update addressed a (owner, task) key that does not exist.
    #[error("task not found: {task_id}")]
    TaskNotFound {
        /// The task id from the path.
        task_id: String,
    },

    /// No route matched the request.
    #[error("route not found")]
    RouteNotFound,

    /// Backend storage failure. Never retried.
    #[error("store error: {0}")]
    Store(String),

    /// Any other unexpected failure, including handler panics.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Maps this error to its HTTP status.
    ///
    /// - `401`: `Unauthorized`
    /// - `400`: `InvalidStatus`, `InvalidTitle`, `NoUpdatableFields`, `InvalidBody`,
    ///   `InvalidPath`
    /// - `404`: `TaskNotFound`, `RouteNotFound`
    /// - `500`: `Store`, `Internal`
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::InvalidStatus { .. }
            | Self::InvalidTitle
            | Self::NoUpdatableFields
            | Self::InvalidBody { .. }
            | Self::InvalidPath { .. } => StatusCode::BAD_REQUEST,
            Self::TaskNotFound { .. } | Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for errors caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl From<StorageError> for TaskError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { task_id, .. } => Self::TaskNotFound { task_id },
            other => Self::Store(other.to_string()),
        }
    }
}
