//! Config file location.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::APP_NAME;
use crate::schema::default_config_document;

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file.
    pub config_file: PathBuf,
}

impl AppPaths {
    /// Resolve the config file, `$XDG_CONFIG_HOME/jandi/config.toml` unless
    /// overridden. An override naming a directory resolves to `config.toml`
    /// inside it.
    ///
    /// # Errors
    ///
    /// Returns an error if the override cannot be expanded or no config
    /// directory can be determined.
    pub fn discover(override_path: Option<&Path>) -> Result<Self> {
        let config_file = match override_path {
            Some(path) => {
                let expanded = match path.to_str() {
                    Some(text) => expand_str_path(text)?,
                    None => path.to_path_buf(),
                };
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => default_config_dir()?.join("config.toml"),
        };
        Ok(Self { config_file })
    }
}

/// Expand `~` and environment variables in a path.
///
/// # Errors
///
/// Returns an error if a referenced variable is unset.
pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// `$XDG_CONFIG_HOME/jandi`, falling back to the platform config dir.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_config_dir() -> Result<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .map(|dir| dir.join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

/// Write the commented default configuration. Credentials are left commented out.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }
    let body = default_config_document(APP_NAME)?;
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}
