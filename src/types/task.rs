//! Task wire types.
//!
//! [`Task`] is both the stored entity and the JSON body returned by the API.
//! [`NewTask`] and [`TaskPatch`] are the request bodies for create and
//! update. All types use `camelCase` field names on the wire.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::TaskError;

/// Title given to tasks created without one.
pub const DEFAULT_TITLE: &str = "Untitled task";

/// Task lifecycle status.
///
/// Unlike a workflow state machine, any status may be set from any other;
/// the only rule is that the value is one of the three below.
///
/// # Examples
///
/// ```
/// use pkce_tasks::TaskStatus;
///
/// assert_eq!("in-progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
/// assert!("bogus".parse::<TaskStatus>().is_err());
/// assert_eq!(TaskStatus::Done.to_string(), "done");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not started. The default for new tasks.
    #[default]
    #[serde(rename = "todo")]
    Todo,
    /// Being worked on.
    #[serde(rename = "in-progress")]
    InProgress,
    /// Finished.
    #[serde(rename = "done")]
    Done,
}

impl TaskStatus {
    /// Every accepted status, in wire form. Echoed back on `InvalidStatus`.
    pub const ALLOWED: [&'static str; 3] = ["todo", "in-progress", "done"];

    /// Returns the wire form of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "in-progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(TaskError::InvalidStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// A persisted task, addressed by the composite (`owner_id`, `task_id`) key.
///
/// # Examples
///
/// ```
/// use pkce_tasks::{Task, TaskStatus};
///
/// let task = Task::new("u1", "Buy milk", "", TaskStatus::Todo);
/// let json = serde_json::to_value(&task).unwrap();
/// assert_eq!(json["ownerId"], "u1");
/// assert_eq!(json["status"], "todo");
/// assert_eq!(json["createdAt"], json["updatedAt"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Partition key. The `sub` claim of the caller's bearer token.
    pub owner_id: String,

    /// Sort key. A `UUIDv4` generated by the server.
    pub task_id: String,

    /// Display title, never empty.
    pub title: String,

    /// Free text, possibly empty.
    #[serde(default)]
    pub description: String,

    /// Current status.
    pub status: TaskStatus,

    /// ISO 8601 creation timestamp (microsecond precision, UTC). Immutable.
    pub created_at: String,

    /// ISO 8601 timestamp of the last successful mutation.
    pub updated_at: String,
}

impl Task {
    /// Creates a task with a fresh `UUIDv4` id and both timestamps set to now.
    pub fn new(
        owner_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        status: TaskStatus,
    ) -> Self {
        let now = timestamp_now();
        Self {
            owner_id: owner_id.into(),
            task_id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            status,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

static LAST_STAMP_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Returns the current UTC time formatted like `2025-01-01T12:00:00.000000Z`.
///
/// The fixed width keeps lexicographic and chronological order identical.
/// Successive calls within one process never return the same value: a call
/// landing in the same microsecond as the previous one is pushed forward by
/// one microsecond.
pub fn timestamp_now() -> String {
    let now = Utc::now().timestamp_micros();
    let previous = LAST_STAMP_MICROS
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now.max(last.saturating_add(1)))
        })
        .unwrap_or(now);
    let micros = now.max(previous.saturating_add(1));
    DateTime::<Utc>::from_timestamp_micros(micros)
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts any JSON value for `status`.
///
/// Strings pass through untouched, `null` is absent, and any other value is
/// kept as its JSON text so that create can fall back to the default status
/// and update can report it as an invalid status.
fn lenient_status<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Body of `POST /tasks`.
///
/// Every field is optional; see
/// [`GenericTaskStore::create`](crate::store::generic::GenericTaskStore::create)
/// for the defaults. Unknown fields (including any `ownerId`) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    /// Requested title. Blank or missing falls back to [`DEFAULT_TITLE`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Requested description. Missing falls back to `""`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Requested status as sent by the client. Not validated here.
    #[serde(
        default,
        deserialize_with = "lenient_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<String>,
}

/// Body of `PUT /tasks/{taskId}`.
///
/// `None` means the key was absent (or `null`) and the stored value must be
/// left alone. `Some(String::new())` is a real value.
///
/// # Examples
///
/// ```
/// use pkce_tasks::types::TaskPatch;
///
/// let patch: TaskPatch = serde_json::from_str(r#"{"description":""}"#).unwrap();
/// assert_eq!(patch.description.as_deref(), Some(""));
/// assert!(patch.title.is_none());
/// assert!(!patch.is_empty());
///
/// let empty: TaskPatch = serde_json::from_str(r#"{"updatedAt":"x"}"#).unwrap();
/// assert!(empty.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// New title, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// New description, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// New status as sent by the client. Validated before any write.
    #[serde(
        default,
        deserialize_with = "lenient_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<String>,
}

impl TaskPatch {
    /// Returns `true` if no recognized field is present.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.status.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn status_serializes_to_wire_names() {
        assert_eq!(serde_json::to_value(TaskStatus::Todo).unwrap(), json!("todo"));
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).unwrap(),
            json!("in-progress")
        );
        assert_eq!(serde_json::to_value(TaskStatus::Done).unwrap(), json!("done"));
    }

    #[test]
    fn status_parse_rejects_unknown_and_case_variants() {
        assert!(matches!(
            "Done".parse::<TaskStatus>(),
            Err(TaskError::InvalidStatus { value }) if value == "Done"
        ));
        assert!("in_progress".parse::<TaskStatus>().is_err());
        assert!("".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn allowed_matches_as_str() {
        let all = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];
        let names: Vec<&str> = all.iter().map(TaskStatus::as_str).collect();
        assert_eq!(names, TaskStatus::ALLOWED.to_vec());
    }

    #[test]
    fn new_task_has_uuid_and_equal_timestamps() {
        let task = Task::new("owner", "t", "d", TaskStatus::Done);
        let parsed = Uuid::parse_str(&task.task_id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(task.created_at, task.updated_at);
        assert!(task.created_at.ends_with('Z'));
        assert_eq!(task.created_at.len(), "2025-01-01T12:00:00.000000Z".len());
    }

    #[test]
    fn timestamps_strictly_increase_and_keep_width() {
        let stamps: Vec<String> = (0..1000).map(|_| timestamp_now()).collect();
        for pair in stamps.windows(2) {
            assert!(pair[1] > pair[0], "{} !> {}", pair[1], pair[0]);
        }
        assert!(stamps
            .iter()
            .all(|s| s.len() == "2025-01-01T12:00:00.000000Z".len() && s.ends_with('Z')));
    }

    #[test]
    fn task_json_uses_camel_case_keys() {
        let task = Task::new("u1", "Buy milk", "", TaskStatus::Todo);
        let value = serde_json::to_value(&task).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "ownerId",
            "taskId",
            "title",
            "description",
            "status",
            "createdAt",
            "updatedAt",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(obj.len(), 7);
    }

    #[test]
    fn patch_null_is_treated_as_absent() {
        let patch: TaskPatch = serde_json::from_value(json!({"title": null})).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn patch_ignores_owner_id_in_body() {
        let patch: TaskPatch =
            serde_json::from_value(json!({"ownerId": "someone-else", "status": "done"})).unwrap();
        assert_eq!(patch.status.as_deref(), Some("done"));
        assert!(patch.title.is_none());
    }

    #[test]
    fn non_string_status_is_kept_as_json_text() {
        let patch: TaskPatch = serde_json::from_value(json!({"status": 5})).unwrap();
        assert_eq!(patch.status.as_deref(), Some("5"));

        let body: NewTask = serde_json::from_value(json!({"status": {"a": 1}})).unwrap();
        assert_eq!(body.status.as_deref(), Some(r#"{"a":1}"#));

        let body: NewTask = serde_json::from_value(json!({"status": null})).unwrap();
        assert!(body.status.is_none());
    }

    #[test]
    fn new_task_body_defaults_to_all_absent() {
        let body: NewTask = serde_json::from_str("{}").unwrap();
        assert_eq!(body, NewTask::default());
    }
}
