//! Task route handlers.
//!
//! Each handler takes the owner from the [`Owner`] extractor; request bodies
//! never influence which partition is touched.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;

use crate::error::TaskError;
use crate::server::auth::Owner;
use crate::server::response::{JsonBody, TaskId};
use crate::server::AppState;
use crate::types::task::{NewTask, Task, TaskPatch};

/// `GET /tasks`
pub async fn list_tasks(
    State(state): State<AppState>,
    owner: Owner,
) -> Result<Json<Vec<Task>>, TaskError> {
    let tasks = state.store.list(owner.id()).await?;
    tracing::debug!(owner_id = owner.id(), count = tasks.len(), "listed tasks");
    Ok(Json(tasks))
}

/// `POST /tasks`
pub async fn create_task(
    State(state): State<AppState>,
    owner: Owner,
    JsonBody(input): JsonBody<NewTask>,
) -> Result<impl IntoResponse, TaskError> {
    let task = state.store.create(owner.id(), input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `PUT /tasks/{task_id}`
pub async fn update_task(
    State(state): State<AppState>,
    owner: Owner,
    TaskId(task_id): TaskId,
    JsonBody(patch): JsonBody<TaskPatch>,
) -> Result<Json<Task>, TaskError> {
    let task = state.store.update(owner.id(), &task_id, patch).await?;
    Ok(Json(task))
}

/// `DELETE /tasks/{task_id}`
pub async fn delete_task(
    State(state): State<AppState>,
    owner: Owner,
    TaskId(task_id): TaskId,
) -> Result<StatusCode, TaskError> {
    state.store.delete(owner.id(), &task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
