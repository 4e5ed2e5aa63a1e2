//! Client configuration loaded from a JSON file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BrokerageError, Result};

/// Environment variables consulted, in order, for the config file path.
pub const CONFIG_ENV_VARS: [&str; 2] = ["SCHWAB_CLIENT_CONFIG", "CONFIG_FILE_LOCATION"];

/// Schwab API endpoints
pub const SCHWAB_API_BASE: &str = "https://api.schwabapi.com";
pub const SCHWAB_AUTH_URL: &str = "https://api.schwabapi.com/v1/oauth/authorize";
pub const SCHWAB_TOKEN_URL: &str = "https://api.schwabapi.com/v1/oauth/token";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// OAuth client registration plus local paths and optional endpoint overrides.
#[derive(Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Application key from the developer portal
    pub client_id: String,

    /// Application secret
    pub client_secret: String,

    /// Registered callback URL
    pub redirect_uri: String,

    /// Where the credential is persisted
    pub token_file: PathBuf,

    /// API base URL (defaults to production)
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Authorize endpoint override
    #[serde(default)]
    pub auth_url: Option<String>,

    /// Token endpoint override
    #[serde(default)]
    pub token_url: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl BrokerConfig {
    /// Read and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|e| {
            BrokerageError::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;

        let config: Self = serde_json::from_slice(&raw).map_err(|e| {
            BrokerageError::Config(format!("failed to parse config file {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Locate the config file through the environment and load it.
    pub fn from_env() -> Result<Self> {
        let path = CONFIG_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            .ok_or_else(|| {
                BrokerageError::Config(format!(
                    "config location not found: set {}",
                    CONFIG_ENV_VARS.join(" or ")
                ))
            })?;

        Self::from_file(Path::new(&path))
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(BrokerageError::Config(format!("{} must not be empty", name)));
            }
        }
        if self.token_file.as_os_str().is_empty() {
            return Err(BrokerageError::Config("token_file must not be empty".to_string()));
        }
        if self.timeout_secs == Some(0) {
            return Err(BrokerageError::Config("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(SCHWAB_API_BASE)
    }

    pub fn auth_url(&self) -> &str {
        self.auth_url.as_deref().unwrap_or(SCHWAB_AUTH_URL)
    }

    pub fn token_url(&self) -> &str {
        self.token_url.as_deref().unwrap_or(SCHWAB_TOKEN_URL)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("token_file", &self.token_file)
            .field("api_base_url", &self.api_base_url())
            .field("timeout_secs", &self.timeout().as_secs())
            .finish()
    }
}
