use std::path::PathBuf;
use thiserror::Error;

/// Core error type for frosty configuration and setup.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read config at {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
