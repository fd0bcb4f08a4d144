use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use super::timers::DEFAULT_STALL_WARNING_MS;

pub const ENV_TETHER_CONFIG: &str = "TETHER_CONFIG";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_PAGE_ORIGIN: &str = "http://localhost:8000";
const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;
const DEFAULT_NOTIFICATION_MS: u64 = 4_000;
const DEFAULT_TOOL_OUTCOME_MS: u64 = 2_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub api_base_url: String,
    /// Explicit WebSocket endpoint. Derived from `page_origin` when unset.
    pub ws_url: Option<String>,
    pub page_origin: String,
    /// `Cookie` header value sent with every request and the socket
    /// handshake, e.g. `session=...` copied from a logged-in browser.
    pub session_cookie: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_url: None,
            page_origin: DEFAULT_PAGE_ORIGIN.to_string(),
            session_cookie: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    pub reconnect_delay_ms: u64,
    pub stall_warning_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            stall_warning_ms: DEFAULT_STALL_WARNING_MS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    pub default_ms: u64,
    pub tool_outcome_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_ms: DEFAULT_NOTIFICATION_MS,
            tool_outcome_ms: DEFAULT_TOOL_OUTCOME_MS,
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw, "<inline>")
    }

    /// Reads a config file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw, &shown),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %shown, "config file missing, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: shown,
                source,
            }),
        }
    }

    fn parse(raw: &str, path: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "server.api_base_url must not be empty".to_string(),
            ));
        }
        if self.server.page_origin.trim().is_empty() && self.server.ws_url.is_none() {
            return Err(ConfigError::Invalid(
                "either server.page_origin or server.ws_url must be set".to_string(),
            ));
        }
        if self
            .server
            .session_cookie
            .as_deref()
            .is_some_and(|cookie| cookie.chars().any(char::is_control))
        {
            return Err(ConfigError::Invalid(
                "server.session_cookie must not contain control characters".to_string(),
            ));
        }
        if self.sync.reconnect_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "sync.reconnect_delay_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
