//! Owner-scoped task API with an OAuth2 Authorization-Code + PKCE client.
//!
//! The crate has two halves that meet at the bearer token:
//!
//! - **Client** ([`client`]) - the PKCE flow controller, the session-scoped
//!   token cache it persists into, and a small HTTP client for the task API.
//! - **Server** ([`server`], [`store`]) - an axum router whose authorization
//!   extractor turns the bearer token into an owner identity, and an
//!   owner-scoped record store that applies sparse updates through an
//!   update-expression builder.
//!
//! ```text
//! PkceFlow ──► TokenCache ──► TasksClient ──(Bearer)──► Owner extractor ──► TaskStore
//!                                                                            │
//!                                                        UpdateExpression ◄──┘
//! ```
//!
//! # Module Organization
//!
//! - [`types`] - `Task`, `TaskStatus` and request bodies
//! - [`store`] - record store, update-expression builder and storage backends
//! - [`server`] - HTTP router, authorization middleware and error responses
//! - [`client`] - PKCE flow controller, token cache, session stores
//! - [`config`] - TOML + environment configuration
//! - [`error`] - error types shared across the crate

pub mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::{StorageError, TaskError};
pub use store::generic::GenericTaskStore;
pub use store::memory::InMemoryTaskStore;
pub use store::TaskStore;
pub use types::task::{Task, TaskStatus};
