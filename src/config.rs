//! Runtime configuration.
//!
//! Values come from built-in defaults, optionally overlaid by a TOML file and
//! then by `DMAPI_*` environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, Result};

const DATA_DIR: &str = ".dmapi";
const DATABASE_FILE: &str = "dmapi.db";

pub const DATA_DIR_ENV: &str = "DMAPI_DATA_DIR";
pub const REQUEST_TIMEOUT_ENV: &str = "DMAPI_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// Directory holding the database file. Created on initialize.
    pub data_dir: PathBuf,
    pub database_file: String,
    /// Upper bound for a single outbound call.
    pub request_timeout_secs: u64,
    pub max_redirects: usize,
    pub recent_history_limit: usize,
    /// Collection that receives ad hoc requests recorded by `send`.
    pub default_collection_name: String,
    pub seed_defaults: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(DATA_DIR),
            database_file: DATABASE_FILE.to_string(),
            request_timeout_secs: 30,
            max_redirects: 10,
            recent_history_limit: 50,
            default_collection_name: "Default Collection".to_string(),
            seed_defaults: true,
        }
    }
}

impl Config {
    /// Config rooted at `data_dir`, everything else default.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| AppError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
            .map_err(|err| AppError::Config(format!("`{}`: {err}", path.display())))
    }

    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Applies `DMAPI_DATA_DIR` and `DMAPI_REQUEST_TIMEOUT_SECS` when set.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(raw) = std::env::var(REQUEST_TIMEOUT_ENV) {
            self.request_timeout_secs = raw.trim().parse().map_err(|err| {
                AppError::Config(format!("{REQUEST_TIMEOUT_ENV} must be a number of seconds: {err}"))
            })?;
        }
        Ok(self)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_redirects, 10);
        assert!(config.database_path().ends_with(".dmapi/dmapi.db"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            data_dir = "/tmp/dmapi-test"
            request_timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/dmapi-test"));
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.database_file, "dmapi.db");
        assert_eq!(config.recent_history_limit, 50);
    }

    #[test]
    fn from_file_reports_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dmapi.toml");
        fs::write(&path, "request_timeout_secs = \"soon\"").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
