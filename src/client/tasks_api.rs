//! HTTP client for the task API.
//!
//! Every request carries the cached access token as a bearer credential.
//! The client never starts a login: with no valid token it fails with
//! [`ClientError::NotAuthenticated`] and the caller decides what to do.

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use super::session::SessionError;
use super::token_cache::TokenCache;
use crate::types::{NewTask, Task, TaskPatch};

/// Errors from [`TasksClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No valid access token is cached.
    #[error("not logged in; run `pkce-tasks login` first")]
    NotAuthenticated,

    /// The API answered a non-success status.
    #[error("task API returned {status}: {body}")]
    Api {
        /// HTTP status.
        status: StatusCode,
        /// Response body as text.
        body: String,
    },

    /// The request did not complete or the body could not be decoded.
    #[error("task API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token cache could not be read.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ClientError {
    /// HTTP status of an [`ClientError::Api`] error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Task API client bound to one base URL and one token cache.
#[derive(Debug, Clone)]
pub struct TasksClient {
    base_url: String,
    http: reqwest::Client,
    cache: TokenCache,
}

impl TasksClient {
    /// Creates a client for the API at `base_url` (no trailing slash needed).
    pub fn new(base_url: impl Into<String>, cache: TokenCache) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
            cache,
        }
    }

    /// Uses `client` for requests.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let tokens = self
            .cache
            .tokens()?
            .filter(|t| t.is_valid_at(chrono::Utc::now()))
            .ok_or(ClientError::NotAuthenticated)?;
        Ok(self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header(reqwest::header::AUTHORIZATION, tokens.to_header_value()))
    }

    async fn send(request: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(%status, %body, "task API error");
        Err(ClientError::Api { status, body })
    }

    async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        Ok(Self::send(request).await?.json().await?)
    }

    /// `GET /tasks`
    ///
    /// # Errors
    ///
    /// See [`ClientError`].
    pub async fn list_tasks(&self) -> Result<Vec<Task>, ClientError> {
        Self::json(self.request(Method::GET, "/tasks")?).await
    }

    /// `POST /tasks`
    ///
    /// # Errors
    ///
    /// See [`ClientError`].
    pub async fn create_task(&self, task: &NewTask) -> Result<Task, ClientError> {
        Self::json(self.request(Method::POST, "/tasks")?.json(task)).await
    }

    /// `PUT /tasks/{task_id}`
    ///
    /// # Errors
    ///
    /// See [`ClientError`].
    pub async fn update_task(&self, task_id: &str, patch: &TaskPatch) -> Result<Task, ClientError> {
        let path = format!("/tasks/{}", urlencoding::encode(task_id));
        Self::json(self.request(Method::PUT, &path)?.json(patch)).await
    }

    /// `DELETE /tasks/{task_id}`
    ///
    /// # Errors
    ///
    /// See [`ClientError`].
    pub async fn delete_task(&self, task_id: &str) -> Result<(), ClientError> {
        let path = format!("/tasks/{}", urlencoding::encode(task_id));
        Self::send(self.request(Method::DELETE, &path)?).await?;
        Ok(())
    }
}
