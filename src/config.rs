//! Configuration for sitecatalog

use crate::search_console::DEFAULT_ENDPOINT;
use crate::sitemap::DEFAULT_MAX_DEPTH;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub sitemap: SitemapConfig,

    #[serde(default)]
    pub search_console: SearchConsoleConfig,
}

/// Catalog database location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

/// Outbound HTTP settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Sitemap expansion limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitemapConfig {
    /// Deepest sitemap index nesting that is still expanded
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Default entry cap per ingestion run
    #[serde(default)]
    pub max_urls: Option<usize>,
}

/// Search Console API access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConsoleConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Pre-issued OAuth bearer token
    #[serde(default)]
    pub access_token: Option<String>,
}

fn default_database_path() -> PathBuf {
    PathBuf::from(".sitecatalog").join("catalog.db")
}

fn default_user_agent() -> String {
    format!("{}/{}", crate::APP_NAME, crate::VERSION)
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_urls: None,
        }
    }
}

impl Default for SearchConsoleConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            access_token: None,
        }
    }
}

impl CatalogConfig {
    /// Per-user configuration file, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(crate::APP_NAME).join("config.toml"))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the per-user file is read
    /// when present and defaults are used otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path().filter(|path| path.exists()) {
                Some(path) => Self::from_file(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: CatalogConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CatalogConfig::default();
        assert_eq!(config.database.path, PathBuf::from(".sitecatalog/catalog.db"));
        assert_eq!(config.http.timeout(), Duration::from_secs(20));
        assert!(config.http.user_agent.starts_with("sitecatalog/"));
        assert_eq!(config.sitemap.max_depth, 8);
        assert_eq!(config.sitemap.max_urls, None);
        assert_eq!(config.search_console.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: CatalogConfig = toml::from_str(
            r#"
[sitemap]
max_urls = 500

[search_console]
access_token = "abc"
"#,
        )
        .unwrap();

        assert_eq!(config.sitemap.max_urls, Some(500));
        assert_eq!(config.sitemap.max_depth, 8);
        assert_eq!(config.search_console.access_token.as_deref(), Some("abc"));
        assert_eq!(config.search_console.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.http, HttpConfig::default());
    }

    #[test]
    fn test_serialized_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = CatalogConfig::default();
        config.database.path = dir.path().join("catalog.db");
        config.http.timeout_secs = 5;
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(CatalogConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CatalogConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[http]\ntimeout_secs = \"soon\"\n").unwrap();
        assert!(CatalogConfig::from_file(&path).is_err());
    }
}
