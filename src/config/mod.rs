//! Publisher configuration
//!
//! Loaded from a JSON file (`publisher_config.json`) or, when the path ends in
//! `.toml`, from TOML. Required keys are checked up front so a bad config
//! fails before any reconciliation starts.

mod defaults;

pub use defaults::{GITHUB_API_URL, GITHUB_UPLOADS_URL, HTTP_TIMEOUT_SECONDS};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::retention::RetentionPolicy;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Missing required setting '{0}'")]
    MissingField(&'static str),
}

/// Which backend publishes builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Mirror files into a local directory
    Local,
    /// Publish as GitHub releases
    Remote,
}

/// Publisher configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory holding one sub-directory per device
    #[serde(default)]
    pub builds_path: PathBuf,

    /// Manifest file
    #[serde(default)]
    pub builds_json_path: PathBuf,

    /// Builds kept per device (0 = unlimited)
    #[serde(default)]
    pub builds_limit: usize,

    /// GitHub token; selects the remote backend when non-empty
    #[serde(default)]
    pub github_token: String,

    /// GitHub organization owning the per-device repositories
    /// (empty = the token's user)
    #[serde(default)]
    pub github_organization: String,

    /// Devices never published
    #[serde(default)]
    pub blacklisted_devices: Vec<String>,

    /// Versions never published
    #[serde(default)]
    pub ignored_versions: Vec<String>,

    /// Local backend mirror root (default: `builds_path`)
    #[serde(default)]
    pub publish_path: Option<PathBuf>,

    #[serde(default = "defaults::github_api_url")]
    pub github_api_url: String,

    #[serde(default = "defaults::github_uploads_url")]
    pub github_uploads_url: String,

    /// Remote request timeout in seconds
    #[serde(default = "defaults::http_timeout_seconds")]
    pub http_timeout_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.github_token.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("Config")
            .field("builds_path", &self.builds_path)
            .field("builds_json_path", &self.builds_json_path)
            .field("builds_limit", &self.builds_limit)
            .field("github_token", &token)
            .field("github_organization", &self.github_organization)
            .field("blacklisted_devices", &self.blacklisted_devices)
            .field("ignored_versions", &self.ignored_versions)
            .field("publish_path", &self.publish_path)
            .field("github_api_url", &self.github_api_url)
            .field("github_uploads_url", &self.github_uploads_url)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .finish()
    }
}

impl Config {
    /// Load configuration from a file, picking the format by extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let is_toml = path.extension().map(|e| e == "toml").unwrap_or(false);
        if is_toml {
            Self::parse_toml(&content)
        } else {
            Self::parse_json(&content)
        }
    }

    /// Parse configuration from a JSON string
    pub fn parse_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.builds_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("builds_path"));
        }
        if self.builds_json_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("builds_json_path"));
        }
        Ok(())
    }

    /// Remote when a GitHub token is configured, local otherwise.
    pub fn backend_kind(&self) -> BackendKind {
        if self.github_token.is_empty() {
            BackendKind::Local
        } else {
            BackendKind::Remote
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::keep_last_n(self.builds_limit)
    }

    pub fn is_blacklisted(&self, device: &str) -> bool {
        self.blacklisted_devices.iter().any(|d| d == device)
    }

    pub fn is_ignored_version(&self, version: &str) -> bool {
        self.ignored_versions.iter().any(|v| v == version)
    }

    /// Directory the local backend mirrors builds into.
    pub fn publish_root(&self) -> &Path {
        self.publish_path.as_deref().unwrap_or(&self.builds_path)
    }
}
