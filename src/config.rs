use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::notion::NOTION_API_URL;

pub const CONFIG_FILE: &str = "config.json";

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("wick")
}

fn default_sync_interval_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_notion_api_url() -> String {
    NOTION_API_URL.to_string()
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct WickConfig {
    #[serde(default = "default_data_dir")]
    pub data_directory: PathBuf,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_notion_api_url")]
    pub notion_api_url: String,
    #[serde(default)]
    pub debug_logging: bool,
}

impl Default for WickConfig {
    fn default() -> Self {
        Self {
            data_directory: default_data_dir(),
            sync_interval_secs: default_sync_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            notion_api_url: default_notion_api_url(),
            debug_logging: false,
        }
    }
}

impl WickConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("wick")
            .join(CONFIG_FILE)
    }

    /// Load from `path`. A missing file yields defaults; a malformed one is an error.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn sync_interval(&self) -> Duration {
        // A zero interval would make tokio's interval panic
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Ensure the data directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = WickConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, WickConfig::default());
        assert_eq!(config.sync_interval(), Duration::from_secs(300));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{ "sync_interval_secs": 60, "debug_logging": true }"#).unwrap();

        let config = WickConfig::load(&path).unwrap();
        assert_eq!(config.sync_interval_secs, 60);
        assert!(config.debug_logging);
        assert_eq!(config.notion_api_url, NOTION_API_URL);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "sync_interval_secs = 60").unwrap();
        assert!(WickConfig::load(&path).is_err());
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config = WickConfig {
            sync_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.sync_interval(), Duration::from_secs(1));
    }
}
