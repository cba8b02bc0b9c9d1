//! Initialize the data directory: create ~/.natter with a default config and an empty history.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::store;

/// Create the data directory and default files if they do not exist.
/// - Creates the directory (parent of the config file path).
/// - Writes the config with the default profile if missing.
/// - Writes an empty chat history list if missing.
pub fn init_data_dir(config_path: &Path) -> Result<PathBuf> {
    let data_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    if !config_path.exists() {
        let mut default_config = Config::default();
        default_config.normalize();
        config::save_config(&default_config, config_path)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    let history = config::history_path(config_path);
    if !history.exists() {
        store::write_atomic(&history, b"[]")
            .with_context(|| format!("writing empty chat history to {}", history.display()))?;
        log::info!("created chat history at {}", history.display());
    }

    Ok(data_dir.to_path_buf())
}
