//! Configuration loading and root folder resolution
//!
//! Two layers:
//! 1. **TOML bootstrap**: root folder, bind address, storage paths, logging
//! 2. **Resolved service config**: every path made concrete from the root folder
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `EBD_ROOT_FOLDER`
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "EBD_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Root folder holding the database and the data tree
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// SQLite database file, defaults to `{root}/ebd.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Where uploaded waveforms are stored, defaults to `{root}/data/waveforms`
    #[serde(default)]
    pub waveform_filepath: Option<PathBuf>,

    /// Where uploaded station files are stored, defaults to `{root}/data/responses`
    #[serde(default)]
    pub station_filepath: Option<PathBuf>,

    /// Largest accepted request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: default_bind_address(),
            database_path: None,
            waveform_filepath: None,
            station_filepath: None,
            max_upload_bytes: default_max_upload_bytes(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:5730".to_string()
}

fn default_max_upload_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load the TOML configuration
///
/// An explicitly requested file must exist and parse. Without an explicit
/// path the platform locations are tried; if none exists the defaults are
/// used and a warning is logged.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        return read_toml_config(path);
    }

    match default_config_file() {
        Some(path) => read_toml_config(&path),
        None => {
            warn!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Read and parse one TOML configuration file
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Platform configuration file, if one exists
///
/// `~/.config/ebd/config.toml` first, then `/etc/ebd/config.toml`.
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("ebd").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/ebd/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }
    None
}

/// Resolve the root folder from CLI argument, environment, TOML and default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ebd"))
        .unwrap_or_else(|| PathBuf::from("./ebd_data"))
}

/// Fully resolved configuration the server runs with
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub bind_address: String,
    pub database_path: PathBuf,
    pub waveform_filepath: PathBuf,
    pub station_filepath: PathBuf,
    pub max_upload_bytes: usize,
    pub log_level: String,
    /// Log to this file instead of stderr
    pub log_file: Option<PathBuf>,
}

impl ServiceConfig {
    /// Make every path concrete relative to the resolved root folder
    pub fn resolve(root_folder: PathBuf, toml_config: TomlConfig) -> Self {
        let database_path = toml_config
            .database_path
            .unwrap_or_else(|| root_folder.join("ebd.db"));
        let waveform_filepath = toml_config
            .waveform_filepath
            .unwrap_or_else(|| root_folder.join("data").join("waveforms"));
        let station_filepath = toml_config
            .station_filepath
            .unwrap_or_else(|| root_folder.join("data").join("responses"));

        Self {
            root_folder,
            bind_address: toml_config.bind_address,
            database_path,
            waveform_filepath,
            station_filepath,
            max_upload_bytes: toml_config.max_upload_bytes,
            log_level: toml_config.logging.level,
            log_file: toml_config.logging.file,
        }
    }

    /// Create the root folder and both storage trees if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for path in [&self.root_folder, &self.waveform_filepath, &self.station_filepath] {
            if !path.exists() {
                std::fs::create_dir_all(path)?;
                info!("Created directory {}", path.display());
            }
        }
        Ok(())
    }
}
