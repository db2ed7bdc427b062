//! # Document Loading
//!
//! Reads the inventory and latency files into generic YAML values.
//!
//! Loading fails fast: a file that cannot be read or parsed is an error, never
//! an empty or partially filled document.

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as YAML")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{path} is empty")]
    Empty { path: PathBuf },
}

/// Loads the YAML document at `path`.
pub fn load_document(path: impl AsRef<Path>) -> Result<Value, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if text.trim().is_empty() {
        return Err(ConfigError::Empty {
            path: path.to_path_buf(),
        });
    }

    let value = parse_document(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if value.is_null() {
        return Err(ConfigError::Empty {
            path: path.to_path_buf(),
        });
    }

    debug!("Loaded {}", path.display());
    Ok(value)
}

/// Parses YAML text into a generic value.
pub fn parse_document(text: &str) -> Result<Value, serde_yaml::Error> {
    serde_yaml::from_str(text)
}
