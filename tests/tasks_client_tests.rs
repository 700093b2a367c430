//! Task API client against a mock server.

use std::sync::Arc;

use chrono::{Duration, Utc};
use mockito::{Matcher, Server, ServerGuard};
use pkce_tasks::client::{ClientError, MemorySessionStore, TasksClient, TokenCache, TokenSet};
use pkce_tasks::types::{NewTask, TaskPatch};
use pkce_tasks::{Task, TaskStatus};
use pretty_assertions::assert_eq;
use serde_json::json;

struct Harness {
    server: ServerGuard,
    cache: TokenCache,
    client: TasksClient,
}

async fn harness() -> Harness {
    let server = Server::new_async().await;
    let cache = TokenCache::new(Arc::new(MemorySessionStore::new()));
    let client = TasksClient::new(format!("{}/", server.url()), cache.clone())
        .with_http_client(reqwest::Client::new());
    Harness {
        server,
        cache,
        client,
    }
}

async fn logged_in() -> Harness {
    let h = harness().await;
    h.cache.store_tokens(TokenSet::new("at-1")).unwrap();
    h
}

fn task_json(task: &Task) -> String {
    serde_json::to_string(task).unwrap()
}

// ─── Authentication Tests ───

#[tokio::test]
async fn requests_carry_the_cached_bearer_token() {
    let mut h = logged_in().await;
    let task = Task::new("u1", "Buy milk", "", TaskStatus::Todo);
    let mock = h
        .server
        .mock("GET", "/tasks")
        .match_header("authorization", "Bearer at-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!("[{}]", task_json(&task)))
        .expect(1)
        .create_async()
        .await;

    let tasks = h.client.list_tasks().await.unwrap();

    mock.assert_async().await;
    assert_eq!(tasks, vec![task]);
}

#[tokio::test]
async fn empty_cache_fails_without_a_request() {
    let mut h = harness().await;
    let mock = h
        .server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    assert!(matches!(
        h.client.list_tasks().await,
        Err(ClientError::NotAuthenticated)
    ));
    assert!(matches!(
        h.client.delete_task("t1").await,
        Err(ClientError::NotAuthenticated)
    ));
    mock.assert_async().await;
}

#[tokio::test]
async fn expired_token_fails_without_a_request() {
    let mut h = harness().await;
    let mut tokens = TokenSet::new("stale");
    tokens.expires_in = Some(60);
    tokens.obtained_at = Some(Utc::now() - Duration::hours(2));
    h.cache.store_tokens(tokens).unwrap();

    let mock = h
        .server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let err = h
        .client
        .create_task(&NewTask::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotAuthenticated));
    assert_eq!(err.status(), None);
    mock.assert_async().await;
}

// ─── Request Tests ───

#[tokio::test]
async fn create_sends_the_body_and_decodes_the_task() {
    let mut h = logged_in().await;
    let created = Task::new("u1", "Write report", "", TaskStatus::InProgress);
    let mock = h
        .server
        .mock("POST", "/tasks")
        .match_header("authorization", "Bearer at-1")
        .match_body(Matcher::Json(
            json!({"title": "Write report", "status": "in-progress"}),
        ))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(task_json(&created))
        .expect(1)
        .create_async()
        .await;

    let task = h
        .client
        .create_task(&NewTask {
            title: Some("Write report".to_string()),
            description: None,
            status: Some("in-progress".to_string()),
        })
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(task, created);
}

#[tokio::test]
async fn task_ids_are_percent_encoded_in_the_path() {
    let mut h = logged_in().await;
    let updated = Task::new("u1", "renamed", "", TaskStatus::Done);
    let put = h
        .server
        .mock("PUT", "/tasks/a%20b%2Fc")
        .match_body(Matcher::Json(json!({"title": "renamed"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(task_json(&updated))
        .expect(1)
        .create_async()
        .await;
    let delete = h
        .server
        .mock("DELETE", "/tasks/a%20b%2Fc")
        .match_header("authorization", "Bearer at-1")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let task = h
        .client
        .update_task(
            "a b/c",
            &TaskPatch {
                title: Some("renamed".to_string()),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap();
    h.client.delete_task("a b/c").await.unwrap();

    put.assert_async().await;
    delete.assert_async().await;
    assert_eq!(task.title, "renamed");
}

// ─── Error Tests ───

#[tokio::test]
async fn non_success_status_keeps_the_server_body() {
    let mut h = logged_in().await;
    let body = r#"{"error":"Task not found","taskId":"missing"}"#;
    let mock = h
        .server
        .mock("PUT", "/tasks/missing")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect(1)
        .create_async()
        .await;

    let err = h
        .client
        .update_task(
            "missing",
            &TaskPatch {
                title: Some("x".to_string()),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.status(), Some(reqwest::StatusCode::NOT_FOUND));
    let ClientError::Api { body: got, .. } = err else {
        panic!("expected an API error");
    };
    assert_eq!(got, body);
}

#[tokio::test]
async fn rejected_token_surfaces_as_unauthorized() {
    let mut h = logged_in().await;
    let mock = h
        .server
        .mock("GET", "/tasks")
        .with_status(401)
        .with_body(r#"{"error":"Unauthorized"}"#)
        .create_async()
        .await;

    let err = h.client.list_tasks().await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
    assert!(err.to_string().contains("Unauthorized"));
}
