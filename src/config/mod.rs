//! Configuration management for feedmill.
//!
//! Configuration is read from `~/.config/feedmill/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 10;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub update: UpdateConfig,
    pub enhancers: EnhancerConfig,
    pub storage: StorageConfig,
}

/// HTTP settings shared by feed, favicon and enhancer page fetches.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds (default: 60)
    pub timeout_secs: u64,

    /// Maximum feeds fetched concurrently (default: 10)
    pub workers: usize,

    pub user_agent: String,

    /// Proxy URL applied to every request, e.g. `http://proxy:8080`
    pub proxy: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            workers: DEFAULT_WORKERS,
            user_agent: concat!("feedmill/", env!("CARGO_PKG_VERSION")).to_string(),
            proxy: None,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Policy knobs for the update orchestrator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Read, non-starred items kept per feed; 0 disables pruning (default: 200)
    pub retention: usize,

    /// Consecutive failures before a feed is flagged for attention (default: 10)
    pub max_failures: i64,

    /// Soft-deleted feeds and folders are purged after this many seconds (default: 60)
    pub purge_after_secs: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            retention: 200,
            max_failures: 10,
            purge_after_secs: 60,
        }
    }
}

impl UpdateConfig {
    pub fn purge_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.purge_after_secs).unwrap_or(i64::MAX))
    }
}

/// Optional overrides for the built-in enhancer tables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnhancerConfig {
    pub selector_table: Option<PathBuf>,
    pub regex_table: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path (default: `<data dir>/feedmill/feedmill.db`)
    pub database: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/feedmill/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("feedmill").join("config.toml"))
    }

    /// Resolve the database path, creating its parent directory.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        let path = match &self.storage.database {
            Some(path) => path.clone(),
            None => dirs::data_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join("feedmill")
                .join("feedmill.db"),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        Ok(path)
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> &'static str {
        r##"# feedmill configuration

[fetch]
# Timeout for every HTTP request (feeds, favicons, article pages), in seconds
timeout_secs = 60

# Number of feeds fetched in parallel
workers = 10

# Route all requests through a proxy
# proxy = "http://localhost:8080"

[update]
# Read, non-starred items kept per feed (0 keeps everything)
retention = 200

# Consecutive fetch failures before a feed is flagged for attention
max_failures = 10

# Delay before soft-deleted feeds and folders are purged, in seconds
purge_after_secs = 60

[enhancers]
# Replace the built-in enhancer tables
# selector_table = "/path/to/selector_enhancers.json"
# regex_table = "/path/to/regex_enhancers.json"

[storage]
# database = "/path/to/feedmill.db"
"##
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid enhancer table {name}: {reason}")]
    EnhancerTable { name: String, reason: String },
}
