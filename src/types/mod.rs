//! Wire types for the task API.

pub mod task;

pub use task::{timestamp_now, NewTask, Task, TaskPatch, TaskStatus, DEFAULT_TITLE};
