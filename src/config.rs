//! Application configuration.
//!
//! Read from a JSON file; every key is optional and falls back to the default
//! below. The file location comes from `CREDIT_DESK_CONFIG`, else
//! `credit-desk.json` in the working directory.

use crate::columns::ColumnMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "CREDIT_DESK_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "credit-desk.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Workbook file holding both tabs
    pub workbook: PathBuf,
    /// Tab with the records being worked on
    pub active_tab: String,
    /// Read-only archive tab
    pub history_tab: String,
    /// User directory (JSON)
    pub users_file: PathBuf,
    /// Session lifetime in hours
    pub session_hours: i64,
    /// Address the web server binds to
    pub bind: String,
    /// Physical layout of the active tab
    pub columns: ColumnMap,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workbook: PathBuf::from("database/base_de_datos.bin.gz"),
            active_tab: "Clientes".to_string(),
            history_tab: "Historico".to_string(),
            users_file: PathBuf::from("database/users.json"),
            session_hours: 24,
            bind: "127.0.0.1:3000".to_string(),
            columns: ColumnMap::default(),
        }
    }
}

impl AppConfig {
    /// Read configuration from `path`; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!("configuration loaded from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("{} not found, using default configuration", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Read configuration from the file named by the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load(path)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_hours.max(1))
    }
}
