use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub db_path: Option<String>,
    pub scope: Option<String>,
    pub page_size: Option<usize>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub sync_poll_interval_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
scope = "0xabc"
page_size = 50
sync_poll_interval_ms = 250
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.scope.as_deref(), Some("0xabc"));
        assert_eq!(config.page_size, Some(50));
        assert_eq!(config.sync_poll_interval_ms, Some(250));
        assert!(config.db_path.is_none());
        assert!(config.port.is_none());
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "page_size = \"lots\"").unwrap();

        let result = FileConfig::load(file.path());
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = FileConfig::load(Path::new("/nonexistent/inode-index.toml"));
        assert!(result.is_err());
    }
}
