//! CLI error type.

use std::path::PathBuf;

use thiserror::Error;
use trove::config::ConfigError;
use trove::discovery::SessionError;
use trove::geo::GeoError;
use trove::logging::LoggingError;
use trove::treasure::TreasureError;

/// Errors surfaced to the user by the `trove` binary.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog: {0}")]
    Catalog(#[from] TreasureError),

    #[error("Invalid track {path}: {source}")]
    Track {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid coordinate: {0}")]
    Geo(#[from] GeoError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
