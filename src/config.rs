//! Service configuration
//!
//! Loaded from a JSON or YAML file, with environment overrides applied on top.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Geographic anchor for every geo-parameterized directory endpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Default for Location {
    fn default() -> Self {
        Self { lat: 0.0, lng: 0.0 }
    }
}

/// Directory-data provider endpoints
///
/// Templates may contain `{lat}` and `{lng}`, substituted with the configured location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Full directory payload for a location (all languages)
    pub endpoint_directory: String,
    /// Lightweight "last updated" marker
    pub endpoint_last_updated: String,
    /// JSON array of node IDs that are currently out of service
    pub endpoint_disabled_nodes: String,
    #[serde(default)]
    pub default_location: Location,
}

impl DirectoryConfig {
    pub fn directory_url(&self) -> String {
        expand_location(&self.endpoint_directory, self.default_location)
    }

    pub fn last_updated_url(&self) -> String {
        expand_location(&self.endpoint_last_updated, self.default_location)
    }

    pub fn disabled_nodes_url(&self) -> String {
        expand_location(&self.endpoint_disabled_nodes, self.default_location)
    }
}

fn expand_location(template: &str, location: Location) -> String {
    template
        .replace("{lat}", &location.lat.to_string())
        .replace("{lng}", &location.lng.to_string())
}

/// Fragments used to detect "say that again" style utterances
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepeatPhrases {
    #[serde(default)]
    pub repeat_matches: Vec<String>,
    #[serde(default)]
    pub repeat_starts: Vec<String>,
    #[serde(default)]
    pub repeat_contains: Vec<String>,
    #[serde(default)]
    pub repeat_ends: Vec<String>,
}

/// Top-level configuration for [`crate::DirectoryContextService`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub directory: DirectoryConfig,
    /// URL of the remote configuration document (aliases, translations, ...)
    #[serde(default)]
    pub conversation_config: Option<String>,
    /// Root of static reference data (`categories/<lang>.json`)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(flatten)]
    pub repeat: RepeatPhrases,
    #[serde(default = "default_directory_check_secs")]
    pub directory_check_secs: u64,
    #[serde(default = "default_disabled_nodes_check_secs")]
    pub disabled_nodes_check_secs: u64,
    #[serde(default = "default_remote_config_check_secs")]
    pub remote_config_check_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_directory_check_secs() -> u64 {
    60
}

fn default_disabled_nodes_check_secs() -> u64 {
    10 * 60
}

fn default_remote_config_check_secs() -> u64 {
    60
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            directory: DirectoryConfig::default(),
            conversation_config: None,
            data_dir: None,
            repeat: RepeatPhrases::default(),
            directory_check_secs: default_directory_check_secs(),
            disabled_nodes_check_secs: default_disabled_nodes_check_secs(),
            remote_config_check_secs: default_remote_config_check_secs(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl ServiceConfig {
    /// Load from a JSON file, or YAML when the extension is `.yaml` / `.yml`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            serde_yaml::from_str(&text)
                .with_context(|| format!("Failed to parse YAML config {}", path.display()))
        } else {
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse JSON config {}", path.display()))
        }
    }

    /// Load from environment variables
    ///
    /// `DIRECTORY_SERVICE_CONFIG` names the config file. `DIRECTORY_INITIAL_LOCATION`,
    /// `CONVERSATION_CONFIG_URL` and `DIRECTORY_DATA_DIR` override the file.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = std::env::var("DIRECTORY_SERVICE_CONFIG")
            .context("DIRECTORY_SERVICE_CONFIG environment variable not set")?;
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("DIRECTORY_INITIAL_LOCATION") {
            match serde_json::from_str::<Location>(&raw) {
                Ok(location) => self.directory.default_location = location,
                Err(e) => tracing::warn!(error = %e, "Ignoring malformed DIRECTORY_INITIAL_LOCATION"),
            }
        }
        if let Some(url) = lookup("CONVERSATION_CONFIG_URL") {
            self.conversation_config = Some(url);
        }
        if let Some(dir) = lookup("DIRECTORY_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Check that every endpoint expands to a parseable URL
    pub fn validate(&self) -> Result<()> {
        let endpoints = [
            ("endpoint_directory", self.directory.directory_url()),
            ("endpoint_last_updated", self.directory.last_updated_url()),
            ("endpoint_disabled_nodes", self.directory.disabled_nodes_url()),
        ];
        for (name, url) in endpoints {
            if url.is_empty() {
                bail!("{} is not configured", name);
            }
            Url::parse(&url).with_context(|| format!("{} is not a valid URL: {}", name, url))?;
        }
        if let Some(url) = &self.conversation_config {
            Url::parse(url)
                .with_context(|| format!("conversation_config is not a valid URL: {}", url))?;
        }
        Ok(())
    }

    pub fn directory_check_interval(&self) -> Duration {
        Duration::from_secs(self.directory_check_secs)
    }

    pub fn disabled_nodes_check_interval(&self) -> Duration {
        Duration::from_secs(self.disabled_nodes_check_secs)
    }

    pub fn remote_config_check_interval(&self) -> Duration {
        Duration::from_secs(self.remote_config_check_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
