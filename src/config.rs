//! Configuration types for the session engine

use crate::error::{Error, Result};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default backend address for local development
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Prefix of the flat environment variables read by [`EngineConfig::from_env`]
pub const ENV_PREFIX: &str = "OPINION_ROOM";

/// Debate backend connection settings
#[derive(Clone)]
pub struct BackendConfig {
    /// Server root; API paths are joined under `/api`
    pub base_url: Url,
    /// Optional bearer token sent with every request
    pub api_token: Option<SecretString>,
    /// Timeout for one-shot calls (create, read, pause, resume).
    /// Streams are never timed out here.
    pub request_timeout: Duration,
    /// TCP connect timeout, applied to streams too
    pub connect_timeout: Duration,
    /// User agent header
    pub user_agent: String,
}

impl BackendConfig {
    /// Create a configuration for the given server root
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_token: None,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("opinion-room/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Parse the server root and create a configuration
    pub fn parse(base_url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(base_url)?))
    }

    /// Set the bearer token
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(SecretString::from(token.into()));
        self
    }

    /// Set the one-shot request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Get the bearer token as a string
    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_ref().map(|t| t.expose_secret())
    }

    /// Absolute URL of an API path such as `discussions/7/start`
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/api/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "***REDACTED***"))
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON records instead of human-readable lines
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Backend connection
    pub backend: BackendConfig,
    /// Logging
    pub logging: LogConfig,
}

/// On-disk / environment shape of [`EngineConfig`]
#[derive(Debug, Deserialize)]
struct RawEngineConfig {
    #[serde(default)]
    backend: RawBackendConfig,
    #[serde(default)]
    logging: LogConfig,
}

#[derive(Debug, Default, Deserialize)]
struct RawBackendConfig {
    base_url: Option<String>,
    api_token: Option<String>,
    request_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

impl RawBackendConfig {
    fn into_config(self) -> Result<BackendConfig> {
        let base_url = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let mut config = BackendConfig::parse(base_url)?;
        if let Some(token) = self.api_token.filter(|t| !t.is_empty()) {
            config = config.with_api_token(token);
        }
        if let Some(secs) = self.request_timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.connect_timeout_secs {
            config = config.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(user_agent) = self.user_agent {
            config = config.with_user_agent(user_agent);
        }
        Ok(config)
    }
}

impl EngineConfig {
    /// Configuration for a backend at `base_url` with default logging
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            logging: LogConfig::default(),
        }
    }

    /// Load from flat environment variables, reading `.env` if present
    pub fn from_env() -> Result<Self> {
        // Load .env if present so local development picks up the backend address
        let _ = dotenv();

        let var = |name: &str| std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok();

        let request_timeout_secs = var("REQUEST_TIMEOUT_SECS")
            .map(|v| {
                v.parse::<u64>().map_err(|_| {
                    Error::config(format!(
                        "{}_REQUEST_TIMEOUT_SECS must be a number of seconds",
                        ENV_PREFIX
                    ))
                })
            })
            .transpose()?;

        let backend = RawBackendConfig {
            base_url: var("BASE_URL"),
            api_token: var("API_TOKEN"),
            request_timeout_secs,
            connect_timeout_secs: None,
            user_agent: None,
        }
        .into_config()?;

        let logging = LogConfig {
            level: var("LOG_LEVEL").unwrap_or_else(default_log_level),
            json: var("LOG_JSON")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        Ok(Self { backend, logging })
    }

    /// Load a YAML/TOML/JSON file layered under `OPINION_ROOM__*` variables
    /// (e.g. `OPINION_ROOM__BACKEND__BASE_URL`)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(true))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let raw: RawEngineConfig = settings.try_deserialize()?;

        Ok(Self {
            backend: raw.backend.into_config()?,
            logging: raw.logging,
        })
    }
}
