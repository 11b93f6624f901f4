//! Configuration file discovery and loading for the binary.

use anyhow::{Context, Result};
use fv_core::config::Config;
use std::path::{Path, PathBuf};

/// Locations searched, in order, when no `--config` is given.
pub const DEFAULT_PATHS: [&str; 3] = [
    "./framevault.toml",
    "~/.config/framevault/config.toml",
    "/etc/framevault/config.toml",
];

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config = Config::from_toml(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config.store.path = expand(&config.store.path);
    for warning in config.validate() {
        tracing::warn!("{}: {}", path.display(), warning);
    }

    Ok(config)
}

/// Load the given file, else the first default location that exists, else
/// built-in defaults. Also returns the file that was read, if any.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = custom_path {
        return Ok((load_config(path)?, Some(path.to_path_buf())));
    }

    for path_str in DEFAULT_PATHS {
        let path = PathBuf::from(shellexpand::tilde(path_str).as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return Ok((load_config(&path)?, Some(path)));
        }
    }

    Ok((Config::default(), None))
}

fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.to_path_buf(),
    }
}
