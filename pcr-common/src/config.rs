//! Configuration file loading and output folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config directory name under the platform config dir
const CONFIG_DIR_NAME: &str = "pcr";

/// Locate the TOML config file for a module.
///
/// Linux checks `~/.config/pcr/<module>.toml`, then `/etc/pcr/<module>.toml`.
/// Other platforms check the platform config dir only. Returns `None` when no
/// file exists.
pub fn discover_config_file(module_name: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", module_name);
    let user_config = dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(&file_name));

    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(CONFIG_DIR_NAME).join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Parse a TOML config file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load module configuration with graceful fallback.
///
/// An explicitly requested file must exist. Without one, the discovered file is
/// used if present, else compiled defaults. A malformed file is always an error.
pub fn load_toml_or_default<T>(explicit: Option<&Path>, module_name: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        info!("Loading config from {}", path.display());
        return load_toml(path);
    }

    match discover_config_file(module_name) {
        Some(path) => {
            info!("Loading config from {}", path.display());
            load_toml(&path)
        }
        None => {
            warn!("No config file found for {}, using defaults", module_name);
            Ok(T::default())
        }
    }
}

/// Output folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config value
/// 4. Current working directory
pub fn resolve_output_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    PathBuf::from(".")
}

/// Create a directory (and parents) if it does not exist
pub fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created directory {}", path.display());
    }
    Ok(())
}
