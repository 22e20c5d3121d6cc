//! Trading configuration files.
//!
//! A file holds any number of `[[configuration]]` tables. Every parameter
//! knob is optional and falls back to its default:
//!
//! ```toml
//! [[configuration]]
//! id = "btc-breakout"
//! name = "Breakout BTC"
//! symbol = "BTC/JPY"
//! strategy = "breakout"
//!
//! [configuration.parameters]
//! lookback_period = 30
//! breakout_threshold = 0.2
//! ```
//!
//! Strategy identifiers are resolved at tick time, so an unknown identifier
//! loads fine and fails that configuration's ticks only.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use ticklab_core::config::TradingConfiguration;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate configuration id '{0}'")]
    DuplicateId(String),

    #[error("configuration '{0}' has an empty symbol")]
    EmptySymbol(String),
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    configuration: Vec<TradingConfiguration>,
}

/// Parse configurations from TOML text.
pub fn parse_configurations(text: &str) -> Result<Vec<TradingConfiguration>, ConfigError> {
    let file: ConfigFile = toml::from_str(text)?;

    let mut seen = HashSet::new();
    for config in &file.configuration {
        if !seen.insert(config.id.as_str().to_string()) {
            return Err(ConfigError::DuplicateId(config.id.to_string()));
        }
        if config.symbol.trim().is_empty() {
            return Err(ConfigError::EmptySymbol(config.id.to_string()));
        }
        if let Err(e) = config.family() {
            warn!(config = %config.id, error = %e, "configuration will fail at tick time");
        }
    }
    Ok(file.configuration)
}

/// Load configurations from a TOML file.
pub fn load_configurations(path: &Path) -> Result<Vec<TradingConfiguration>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_configurations(&text)
}
