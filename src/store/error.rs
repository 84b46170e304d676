use polars::error::PolarsError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which fact table a write targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    Weather,
    AirQuality,
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactKind::Weather => write!(f, "weather"),
            FactKind::AirQuality => write!(f, "air quality"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unsupported store URL scheme '{scheme}': expected a file path, sqlite:// URL or :memory:")]
    UnsupportedScheme { scheme: String },

    #[error("Failed to open store at '{0}'")]
    Open(String, #[source] rusqlite::Error),

    #[error("Failed to create directory for store '{0}'")]
    DirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to initialise store schema")]
    Schema(#[source] rusqlite::Error),

    #[error("Failed to resolve location '{location}'")]
    ResolveLocation {
        location: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to write {kind} fact for '{location}' at {timestamp}")]
    WriteFact {
        kind: FactKind,
        location: String,
        timestamp: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Transaction failed for '{location}'")]
    Transaction {
        location: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Store query failed")]
    Query(#[from] rusqlite::Error),

    #[error("I/O error appending to CSV sink '{0}'")]
    CsvIo(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode CSV record for '{0}'")]
    CsvEncode(PathBuf, #[source] PolarsError),
}
