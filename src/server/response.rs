//! JSON responses, request bodies and the response layers shared by every
//! route.
//!
//! Every response leaving the router, including 404s and captured panics,
//! carries the same CORS header set and `Content-Type: application/json`.

use std::any::Any;

use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE,
};
use http::request::Parts;
use http::{HeaderValue, Method, StatusCode, Uri};
use serde::de::DeserializeOwned;
use serde_json::json;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::error::TaskError;
use crate::server::AppState;
use crate::types::task::TaskStatus;

/// `Access-Control-Allow-Methods` value.
pub const ALLOWED_METHODS: &str = "GET,POST,PUT,DELETE,OPTIONS";

/// `Access-Control-Allow-Headers` value.
pub const ALLOWED_HEADERS: &str = "Content-Type,Authorization";

impl IntoResponse for TaskError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_client_error() {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        let body = match &self {
            Self::Unauthorized { .. } => json!({ "error": "Unauthorized" }),
            Self::InvalidStatus { .. } => json!({
                "error": "Invalid status",
                "allowed": TaskStatus::ALLOWED,
            }),
            Self::InvalidTitle => json!({ "error": "Title must not be empty" }),
            Self::NoUpdatableFields => json!({ "error": "No updatable fields provided" }),
            Self::InvalidBody { details } => json!({
                "error": "Invalid request body",
                "details": details,
            }),
            Self::InvalidPath { details } => json!({
                "error": "Invalid path parameter",
                "details": details,
            }),
            Self::TaskNotFound { task_id } => json!({
                "error": "Task not found",
                "taskId": task_id,
            }),
            Self::RouteNotFound => json!({ "error": "Not found" }),
            Self::Store(details) | Self::Internal(details) => {
                tracing::error!(error = %details, "request failed");
                json!({
                    "error": "Internal Server Error",
                    "details": details,
                })
            },
        };
        (status, Json(body)).into_response()
    }
}

/// JSON request body with lenient framing.
///
/// An empty body reads as `{}`. The body must be a JSON object; arrays and
/// scalars, and objects that do not deserialize into `T`, are a 400
/// [`TaskError::InvalidBody`], whatever the `Content-Type`.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<T> FromRequest<AppState> for JsonBody<T>
where
    T: DeserializeOwned + Send,
{
    type Rejection = TaskError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| TaskError::InvalidBody {
                details: e.body_text(),
            })?;
        let raw: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &bytes[..]
        };
        let invalid = |e: serde_json::Error| TaskError::InvalidBody {
            details: e.to_string(),
        };
        let value: serde_json::Value = serde_json::from_slice(raw).map_err(invalid)?;
        if !value.is_object() {
            return Err(TaskError::InvalidBody {
                details: "expected a JSON object".to_string(),
            });
        }
        serde_json::from_value(value).map(JsonBody).map_err(invalid)
    }
}

/// The `{task_id}` path segment.
///
/// Segments that fail to percent-decode are a 400
/// [`TaskError::InvalidPath`] in the usual JSON error shape.
#[derive(Debug, Clone)]
pub struct TaskId(pub String);

impl FromRequestParts<AppState> for TaskId {
    type Rejection = TaskError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Path(task_id) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| TaskError::InvalidPath {
                details: e.body_text(),
            })?;
        Ok(Self(task_id))
    }
}

/// Answers preflight requests: 200, empty body.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Fallback for unmatched routes and methods.
///
/// `OPTIONS` is answered as a preflight on any path, before authentication.
/// Everything else is a 404.
pub async fn not_found(method: Method, uri: Uri) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    tracing::debug!(%method, path = %uri.path(), "no route");
    TaskError::RouteNotFound.into_response()
}

/// Turns a handler panic into a 500 with the panic message as `details`.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    TaskError::Internal(details).into_response()
}

/// The four header layers applied to every response, outermost last.
pub fn header_layers(
    allowed_origin: HeaderValue,
) -> [SetResponseHeaderLayer<HeaderValue>; 4] {
    [
        SetResponseHeaderLayer::overriding(ACCESS_CONTROL_ALLOW_ORIGIN, allowed_origin),
        SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        ),
        SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ),
        SetResponseHeaderLayer::if_not_present(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn invalid_status_echoes_allowed_values() {
        let response = TaskError::InvalidStatus {
            value: "bogus".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Invalid status", "allowed": ["todo", "in-progress", "done"]})
        );
    }

    #[tokio::test]
    async fn invalid_path_carries_details() {
        let response = TaskError::InvalidPath {
            details: "bad segment".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Invalid path parameter", "details": "bad segment"})
        );
    }

    #[tokio::test]
    async fn unauthorized_hides_reason() {
        let response = TaskError::Unauthorized {
            reason: "token has no subject".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await, json!({"error": "Unauthorized"}));
    }

    #[tokio::test]
    async fn store_failure_carries_details() {
        let response = TaskError::Store("throttled".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Internal Server Error", "details": "throttled"})
        );
    }

    #[tokio::test]
    async fn panic_payloads_become_details() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["details"], "boom");

        let response = handle_panic(Box::new(String::from("owned boom")));
        assert_eq!(body_json(response).await["details"], "owned boom");

        let response = handle_panic(Box::new(42u8));
        assert_eq!(body_json(response).await["details"], "unknown panic");
    }

    #[tokio::test]
    async fn options_fallback_is_ok_anything_else_is_404() {
        let response = not_found(Method::OPTIONS, Uri::from_static("/anything")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = not_found(Method::GET, Uri::from_static("/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({"error": "Not found"}));
    }
}
