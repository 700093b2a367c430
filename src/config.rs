//! Application configuration.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then environment variables. Every section can be omitted from the file.
//!
//! ```toml
//! # pkce-tasks.toml
//! log_level = "debug"
//!
//! [server]
//! bind_addr = "0.0.0.0:3000"
//! allowed_origin = "https://tasks.example.com"
//! api_base_url = "http://127.0.0.1:3000"
//!
//! [store]
//! backend = "dynamodb"
//! table = "Tasks"
//!
//! [auth]
//! domain = "https://my-pool.auth.us-east-1.amazoncognito.com"
//! client_id = "abc123"
//! redirect_uri = "http://localhost:5173"
//! scopes = "openid email"
//! ```
//!
//! # Environment Variable Override
//!
//! ```bash
//! TASKS_BIND_ADDR=0.0.0.0:8080
//! TASKS_ALLOWED_ORIGIN=https://tasks.example.com
//! TASKS_STORE=dynamodb
//! TASKS_TABLE=Tasks
//! COGNITO_DOMAIN=https://my-pool.auth.us-east-1.amazoncognito.com
//! COGNITO_APP_CLIENT_ID=abc123
//! COGNITO_REDIRECT_URI=http://localhost:5173
//! COGNITO_LOGOUT_URI=http://localhost:5173
//! COGNITO_SCOPES="openid email"
//! API_BASE_URL=http://127.0.0.1:3000
//! PKCE_TASKS_LOG=debug
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File read when no `--config` path is given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "pkce-tasks.toml";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`AppConfig`].
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A setting has a value that cannot be used.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Setting name (file key or environment variable).
        key: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A setting required by the requested command is not set.
    #[error("{key} is not configured")]
    Missing {
        /// Setting name (environment variable).
        key: &'static str,
    },
}

/// Which [`TaskBackend`](crate::store::TaskBackend) `serve` uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Process-local store. Lost on restart.
    #[default]
    Memory,
    /// DynamoDB table. Requires the `dynamodb` feature.
    Dynamodb,
}

impl std::str::FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "dynamodb" => Ok(Self::Dynamodb),
            _ => Err(ConfigError::InvalidValue {
                key: "TASKS_STORE".to_string(),
                value: s.to_string(),
                reason: "expected `memory` or `dynamodb`".to_string(),
            }),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address `serve` binds to.
    pub bind_addr: SocketAddr,
    /// Value of `Access-Control-Allow-Origin` on every response.
    pub allowed_origin: String,
    /// Base URL the `tasks` subcommands call.
    pub api_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            allowed_origin: "http://localhost:5173".to_string(),
            api_base_url: None,
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend selection.
    pub backend: StoreKind,
    /// Table name for the DynamoDB backend.
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreKind::Memory,
            table: "Tasks".to_string(),
        }
    }
}

/// Identity-provider settings for the PKCE client.
///
/// `domain` and `client_id` have no default; commands that need them call
/// [`OAuthConfig::require_domain`] and [`OAuthConfig::require_client_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Hosted UI base URL, without trailing slash.
    pub domain: Option<String>,
    /// Public app client id. No secret is ever configured.
    pub client_id: Option<String>,
    /// Where the provider sends the browser back after login.
    pub redirect_uri: String,
    /// Where the provider sends the browser after logout. Defaults to the
    /// origin of `redirect_uri`.
    pub logout_uri: Option<String>,
    /// Space-separated scopes.
    pub scopes: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            domain: None,
            client_id: None,
            redirect_uri: "http://localhost:5173".to_string(),
            logout_uri: None,
            scopes: "openid email".to_string(),
        }
    }
}

impl OAuthConfig {
    /// Returns the configured domain or [`ConfigError::Missing`].
    pub fn require_domain(&self) -> Result<&str, ConfigError> {
        self.domain
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(|d| d.trim_end_matches('/'))
            .ok_or(ConfigError::Missing {
                key: "COGNITO_DOMAIN",
            })
    }

    /// Returns the configured client id or [`ConfigError::Missing`].
    pub fn require_client_id(&self) -> Result<&str, ConfigError> {
        self.client_id
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(ConfigError::Missing {
                key: "COGNITO_APP_CLIENT_ID",
            })
    }

    /// The logout redirect target: `logout_uri`, or the origin of
    /// `redirect_uri`.
    pub fn effective_logout_uri(&self) -> String {
        if let Some(uri) = self.logout_uri.as_deref().filter(|u| !u.is_empty()) {
            return uri.to_string();
        }
        url::Url::parse(&self.redirect_uri)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| self.redirect_uri.clone())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener.
    pub server: ServerConfig,
    /// Identity provider.
    pub auth: OAuthConfig,
    /// Storage backend.
    pub store: StoreConfig,
    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    pub log_level: Option<String>,
}

impl AppConfig {
    /// Loads configuration from `path` (which must exist) or from
    /// [`DEFAULT_CONFIG_FILE`] (if it exists), then applies environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or an
    /// environment variable holds an unusable value.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            },
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parses a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] for an unparsable bind address or store
    /// kind.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = var("TASKS_BIND_ADDR") {
            self.server.bind_addr = addr.parse().map_err(|e| ConfigError::InvalidValue {
                key: "TASKS_BIND_ADDR".to_string(),
                value: addr.clone(),
                reason: format!("{e}"),
            })?;
        }
        if let Some(origin) = var("TASKS_ALLOWED_ORIGIN") {
            self.server.allowed_origin = origin;
        }
        if let Some(base) = var("API_BASE_URL") {
            self.server.api_base_url = Some(base);
        }
        if let Some(kind) = var("TASKS_STORE") {
            self.store.backend = kind.parse()?;
        }
        if let Some(table) = var("TASKS_TABLE") {
            self.store.table = table;
        }
        if let Some(domain) = var("COGNITO_DOMAIN") {
            self.auth.domain = Some(domain);
        }
        if let Some(client_id) = var("COGNITO_APP_CLIENT_ID") {
            self.auth.client_id = Some(client_id);
        }
        if let Some(redirect) = var("COGNITO_REDIRECT_URI") {
            self.auth.redirect_uri = redirect;
        }
        if let Some(logout) = var("COGNITO_LOGOUT_URI") {
            self.auth.logout_uri = Some(logout);
        }
        if let Some(scopes) = var("COGNITO_SCOPES") {
            self.auth.scopes = scopes;
        }
        if let Some(level) = var("PKCE_TASKS_LOG") {
            self.log_level = Some(level);
        }
        Ok(())
    }

    /// Base URL for the `tasks` subcommands: `api_base_url`, or the local
    /// bind address.
    pub fn api_base_url(&self) -> String {
        self.server
            .api_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.server.bind_addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:3000");
        assert_eq!(config.server.allowed_origin, "http://localhost:5173");
        assert_eq!(config.store.backend, StoreKind::Memory);
        assert_eq!(config.store.table, "Tasks");
        assert_eq!(config.auth.scopes, "openid email");
        assert_eq!(config.api_base_url(), "http://127.0.0.1:3000");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[store]\nbackend = \"dynamodb\"\n\n[auth]\nclient_id = \"abc\"").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.store.backend, StoreKind::Dynamodb);
        assert_eq!(config.store.table, "Tasks");
        assert_eq!(config.auth.client_id.as_deref(), Some("abc"));
        assert_eq!(config.auth.redirect_uri, "http://localhost:5173");
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nbind_addr = 3").unwrap();
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("TASKS_BIND_ADDR", "0.0.0.0:8080"),
                ("TASKS_STORE", "DynamoDB"),
                ("COGNITO_DOMAIN", "https://auth.example.com/"),
                ("COGNITO_APP_CLIENT_ID", "client"),
                ("COGNITO_SCOPES", ""),
            ]))
            .unwrap();

        assert_eq!(config.server.bind_addr.port(), 8080);
        assert_eq!(config.store.backend, StoreKind::Dynamodb);
        assert_eq!(config.auth.require_domain().unwrap(), "https://auth.example.com");
        assert_eq!(config.auth.require_client_id().unwrap(), "client");
        assert_eq!(config.auth.scopes, "openid email");
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[("TASKS_BIND_ADDR", "not-an-addr")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "TASKS_BIND_ADDR"));

        let err = config.apply_env(env(&[("TASKS_STORE", "redis")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn missing_provider_settings() {
        let config = OAuthConfig::default();
        assert!(matches!(
            config.require_domain(),
            Err(ConfigError::Missing { key: "COGNITO_DOMAIN" })
        ));
        assert!(config.require_client_id().is_err());
    }

    #[test]
    fn logout_uri_falls_back_to_redirect_origin() {
        let mut config = OAuthConfig {
            redirect_uri: "http://localhost:5173/callback".to_string(),
            ..OAuthConfig::default()
        };
        assert_eq!(config.effective_logout_uri(), "http://localhost:5173");

        config.logout_uri = Some("https://app.example.com/bye".to_string());
        assert_eq!(config.effective_logout_uri(), "https://app.example.com/bye");
    }
}
