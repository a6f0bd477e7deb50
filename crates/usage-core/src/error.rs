use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the solar usage tools.
#[derive(Error, Debug)]
pub enum UsageError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A named input document is not valid JSON.
    #[error("Failed to parse {name}: {source}")]
    DocumentParse {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A JSON value could not be parsed or serialised.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// An epoch-millisecond value is outside the representable range or not
    /// a number at all.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// No `normalUsage` record survived coercion, so nothing can be
    /// normalised.
    #[error("No usable normalUsage records; CSV conversion aborted")]
    EmptyNormalUsage,

    /// A single-file conversion input was not a JSON array.
    #[error("JSON document {0} is not an array")]
    NotAnArray(String),

    /// There is nothing to write out.
    #[error("No data available to export")]
    NoData,

    /// CSV rendering failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The vendor API answered with a non-success status.
    #[error("API request failed with status {0}")]
    Api(u16),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, UsageError>;
