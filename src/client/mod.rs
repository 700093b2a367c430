//! Client side: PKCE login, credential cache and the task API client.
//!
//! - [`flow`] - the Authorization Code + PKCE state machine
//! - [`pkce`] - verifier and challenge generation
//! - [`token_cache`] / [`session`] - where tokens and flow state persist
//! - [`browser`] - how the flow navigates
//! - [`callback`] - loopback listener for the CLI's redirect
//! - [`tasks_api`] - bearer-authenticated calls to the task API

pub mod browser;
pub mod callback;
pub mod flow;
pub mod pkce;
pub mod session;
pub mod tasks_api;
pub mod token_cache;

pub use browser::{Browser, BrowserError, MemoryBrowser, SystemBrowser};
pub use callback::{CallbackError, CallbackListener};
pub use flow::{FlowError, PkceFlow, ProviderError, ProviderSettings};
pub use pkce::PkcePair;
pub use session::{FileSessionStore, MemorySessionStore, SessionError, SessionStore};
pub use tasks_api::{ClientError, TasksClient};
pub use token_cache::{FlowState, PendingAuth, TokenCache, TokenSet};
