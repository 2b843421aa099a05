//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/assetcount/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/assetcount/` (~/.config/assetcount/)
//! - Data: `$XDG_DATA_HOME/assetcount/` (~/.local/share/assetcount/)
//! - State/Logs: `$XDG_STATE_HOME/assetcount/` (~/.local/state/assetcount/)

use crate::error::{Error, Result};
use crate::paginate::FailurePolicy;
use crate::types::AccountDirectoryEntry;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Protected-asset search API
    #[serde(default)]
    pub search: SearchConfig,

    /// Account directory source
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Pagination behavior
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Blob store location
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Search API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// API base URL (e.g., `https://api.example.com/v2`)
    pub base_url: Option<String>,

    /// Path of the search endpoint, appended to `base_url`
    #[serde(default = "default_search_path")]
    pub search_path: String,

    /// Assets requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// API key id (can also use ASSETCOUNT_API_KEY_ID)
    pub api_key_id: Option<String>,

    /// API key secret (can also use ASSETCOUNT_API_KEY_SECRET)
    pub api_key_secret: Option<String>,

    /// JSON file holding `{"apiKeyId": .., "apiKeySecret": ..}`
    pub credentials_file: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            search_path: default_search_path(),
            page_size: default_page_size(),
            timeout_secs: default_timeout(),
            api_key_id: None,
            api_key_secret: None,
            credentials_file: None,
        }
    }
}

impl SearchConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config(
                "search.page_size must be a positive integer".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "search.timeout_secs must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_search_path() -> String {
    "/protected-asset/search".to_string()
}

fn default_page_size() -> u32 {
    1000
}

fn default_timeout() -> u64 {
    60
}

/// Account directory configuration
///
/// Either `base_url` points at a directory-listing API, or `accounts`
/// lists the directory inline. Inline accounts win when both are set.
#[derive(Debug, Deserialize, Clone)]
pub struct DirectoryConfig {
    /// Directory-listing API base URL
    pub base_url: Option<String>,

    /// Path of the account listing endpoint
    #[serde(default = "default_accounts_path")]
    pub accounts_path: String,

    /// Bearer token for the directory API
    pub token: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Inline directory entries
    #[serde(default)]
    pub accounts: Vec<AccountDirectoryEntry>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            accounts_path: default_accounts_path(),
            token: None,
            timeout_secs: default_timeout(),
            accounts: vec![],
        }
    }
}

impl DirectoryConfig {
    /// True when an account directory can be built from this config
    pub fn is_ready(&self) -> bool {
        !self.accounts.is_empty() || self.base_url.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.is_ready() {
            return Err(Error::Config(
                "directory.base_url or [[directory.accounts]] is required".to_string(),
            ));
        }
        if self.accounts.iter().any(|a| a.account_id.is_empty()) {
            return Err(Error::Config(
                "directory.accounts entries need a non-empty id".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_accounts_path() -> String {
    "/accounts".to_string()
}

/// Pagination configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PaginationConfig {
    /// What to do when a page after the first fails: "stop" or "abort"
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

/// Blob store configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    /// Root directory for blobs (default: `$XDG_DATA_HOME/assetcount/blobs`)
    pub root: Option<PathBuf>,
}

impl StoreConfig {
    /// Resolved blob root
    pub fn root_dir(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("blobs"))
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check the settings every command depends on.
    ///
    /// The directory section is checked when a directory is built, since
    /// `fetch` runs without one.
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        if self.directory.accounts.iter().any(|a| a.account_id.is_empty()) {
            return Err(Error::Config(
                "directory.accounts entries need a non-empty id".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/assetcount/config.toml` (~/.config/assetcount/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("assetcount").join("config.toml")
    }

    /// Returns the data directory path (for the local blob store)
    ///
    /// `$XDG_DATA_HOME/assetcount/` (~/.local/share/assetcount/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("assetcount")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/assetcount/` (~/.local/state/assetcount/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("assetcount")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/assetcount/assetcount.log` (~/.local/state/assetcount/assetcount.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("assetcount.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.search.base_url.is_none());
        assert_eq!(config.search.page_size, 1000);
        assert_eq!(config.search.search_path, "/protected-asset/search");
        assert_eq!(config.pagination.on_failure, FailurePolicy::Stop);
        assert!(!config.directory.is_ready());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[search]
base_url = "https://api.example.com/v2"
page_size = 250
credentials_file = "/etc/assetcount/keys.json"

[directory]
base_url = "https://directory.example.com"

[pagination]
on_failure = "abort"

[store]
root = "/var/lib/assetcount"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.search.base_url.as_deref(),
            Some("https://api.example.com/v2")
        );
        assert_eq!(config.search.page_size, 250);
        assert_eq!(config.search.timeout_secs, 60);
        assert_eq!(config.pagination.on_failure, FailurePolicy::Abort);
        assert_eq!(config.store.root_dir(), PathBuf::from("/var/lib/assetcount"));
        assert!(config.directory.is_ready());
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_parse_inline_accounts() {
        let toml = r#"
[[directory.accounts]]
id = "111"
name = "Alpha"

[[directory.accounts]]
id = "222"
name = "Beta"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.directory.accounts.len(), 2);
        assert_eq!(config.directory.accounts[1].account_name, "Beta");
        assert!(config.directory.validate().is_ok());
    }

    #[test]
    fn test_search_config_validation() {
        let config = SearchConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(SearchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_directory_config_validation() {
        assert!(DirectoryConfig::default().validate().is_err());

        let config = DirectoryConfig {
            accounts: vec![AccountDirectoryEntry::new("", "Nameless")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_rejects_zero_page_size() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[search]\npage_size = 0\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
