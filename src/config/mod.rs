//! Locating, loading and checking the station's TOML configuration.

pub use oa_core::config::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = Config::from_toml(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./onair.toml",
        "~/.config/onair/config.toml",
        "/etc/onair/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Reject configurations the station cannot run with; log the rest.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.stream.name.trim().is_empty() {
        anyhow::bail!("Stream name cannot be empty");
    }

    if config.stream.relay_capacity == 0 || config.stream.sink_capacity == 0 {
        anyhow::bail!("Relay and sink capacities must be at least 1");
    }

    for warning in config.validate() {
        tracing::warn!("Config: {}", warning);
    }

    Ok(())
}
