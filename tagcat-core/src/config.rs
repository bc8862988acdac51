//! Configuration loading and data folder resolution

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Environment variable overriding the data folder.
pub const DATA_ENV_VAR: &str = "TAGCAT_DATA";

/// Data folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. `TAGCAT_DATA` environment variable
/// 3. TOML config file (`data_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(cli_arg: Option<&str>) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATA_ENV_VAR) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(data_folder) = config.get("data_folder").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(data_folder));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_data_folder())
}

/// Path of the SQLite database inside the data folder.
pub fn database_path(data_folder: &Path) -> PathBuf {
    data_folder.join("tagcat.db")
}

/// Locate the configuration file for the platform.
fn find_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // ~/.config/tagcat/config.toml first, then /etc/tagcat/config.toml
        if let Some(path) = dirs::config_dir().map(|d| d.join("tagcat").join("config.toml")) {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc/tagcat/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    }

    let config_path = dirs::config_dir()
        .map(|d| d.join("tagcat").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if config_path.exists() {
        Ok(config_path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", config_path)))
    }
}

/// OS-dependent default data folder path.
fn default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("tagcat"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/tagcat"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("tagcat"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/tagcat"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("tagcat"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\tagcat"))
    } else {
        PathBuf::from("./tagcat_data")
    }
}
