//! Error types for landscape configuration and world-geometry loading
//!
//! Only configuration problems are errors. Out-of-bounds queries, unknown
//! option keys and pool exhaustion are answered with soft results instead.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading landscape configuration or world geometry
#[derive(Debug, Error)]
pub enum LandscapeError {
    #[error("failed to read landscape config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed landscape config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid value for setting `{key}`: {value}")]
    InvalidSetting { key: String, value: String },

    #[error("invalid world geometry: {0}")]
    InvalidGeometry(String),
}

pub type LandscapeResult<T> = Result<T, LandscapeError>;
