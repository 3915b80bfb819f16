mod file_config;

pub use file_config::FileConfig;

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_SYNC_POLL_INTERVAL_MS: u64 = 1000;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub scope: Option<String>,
    pub page_size: usize,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub sync_poll_interval_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            scope: None,
            page_size: DEFAULT_PAGE_SIZE,
            port: DEFAULT_PORT,
            logging_level: RequestsLoggingLevel::default(),
            sync_poll_interval_ms: DEFAULT_SYNC_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Index partition served by this process (e.g. a contract address).
    pub scope: String,
    pub page_size: NonZeroUsize,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub sync_poll_interval: Duration,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified on the command line or in config file")
            })?;

        // The database file may not exist yet, its directory must
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                bail!("Database directory does not exist: {:?}", parent);
            }
            if !parent.is_dir() {
                bail!("Database parent is not a directory: {:?}", parent);
            }
        }
        if db_path.is_dir() {
            bail!("db_path points to a directory: {:?}", db_path);
        }

        let scope = file
            .scope
            .or_else(|| cli.scope.clone())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("scope must be specified via --scope or in config file")
            })?;

        let page_size = file.page_size.unwrap_or(cli.page_size);
        let page_size = NonZeroUsize::new(page_size)
            .ok_or_else(|| anyhow::anyhow!("page_size must be greater than zero"))?;

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let sync_poll_interval_ms = file
            .sync_poll_interval_ms
            .unwrap_or(cli.sync_poll_interval_ms);
        if sync_poll_interval_ms == 0 {
            bail!("sync_poll_interval_ms must be greater than zero");
        }

        Ok(Self {
            db_path,
            scope,
            page_size,
            port,
            logging_level,
            sync_poll_interval: Duration::from_millis(sync_poll_interval_ms),
        })
    }
}

/// Parse logging level from string.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_temp_db_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn cli_with_db(temp_dir: &TempDir) -> CliConfig {
        CliConfig {
            db_path: Some(temp_dir.path().join("index.db")),
            scope: Some("0xabc".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("path"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(matches!(
            parse_logging_level("headers"),
            Some(RequestsLoggingLevel::Headers)
        ));
        // Case insensitive
        assert!(matches!(
            parse_logging_level("PATH"),
            Some(RequestsLoggingLevel::Path)
        ));
        // Invalid
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().join("index.db")),
            scope: Some("0xabc".to_string()),
            page_size: 10,
            port: 4000,
            logging_level: RequestsLoggingLevel::Headers,
            sync_poll_interval_ms: 500,
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_path, temp_dir.path().join("index.db"));
        assert_eq!(config.scope, "0xabc");
        assert_eq!(config.page_size.get(), 10);
        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Headers);
        assert_eq!(config.sync_poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_resolve_defaults() {
        let temp_dir = make_temp_db_dir();
        let config = AppConfig::resolve(&cli_with_db(&temp_dir), None).unwrap();

        assert_eq!(config.page_size.get(), DEFAULT_PAGE_SIZE);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Path);
        assert_eq!(config.sync_poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/should/be/overridden/index.db")),
            scope: Some("0xcli".to_string()),
            page_size: 10,
            ..Default::default()
        };

        let file_config = FileConfig {
            db_path: Some(temp_dir.path().join("toml.db").to_string_lossy().to_string()),
            scope: Some("0xtoml".to_string()),
            logging_level: Some("none".to_string()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.db_path, temp_dir.path().join("toml.db"));
        assert_eq!(config.scope, "0xtoml");
        assert_eq!(config.logging_level, RequestsLoggingLevel::None);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.page_size.get(), 10);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_resolve_missing_db_path_error() {
        let cli = CliConfig {
            scope: Some("0xabc".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_path must be specified"));
    }

    #[test]
    fn test_resolve_nonexistent_db_dir_error() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/nonexistent/path/that/should/not/exist/index.db")),
            scope: Some("0xabc".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_db_path_is_directory_error() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().to_path_buf()),
            scope: Some("0xabc".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("points to a directory"));
    }

    #[test]
    fn test_resolve_missing_scope_error() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().join("index.db")),
            scope: Some("   ".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("scope must be specified"));
    }

    #[test]
    fn test_resolve_zero_page_size_error() {
        let temp_dir = make_temp_db_dir();
        let file_config = FileConfig {
            page_size: Some(0),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli_with_db(&temp_dir), Some(file_config));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("page_size"));
    }

    #[test]
    fn test_resolve_zero_poll_interval_error() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            sync_poll_interval_ms: 0,
            ..cli_with_db(&temp_dir)
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("sync_poll_interval_ms"));
    }
}
