use std::path::PathBuf;

use thiserror::Error;

/// Common error type for the register server crates.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] json5::Error),

    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
