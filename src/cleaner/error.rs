use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CleanError {
    #[error("I/O error reading raw CSV '{path}'")]
    ReadIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse raw CSV '{path}'")]
    CsvRead {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("Raw CSV '{path}' has {found} columns, expected {expected}")]
    SchemaMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("Raw frame has {found} columns, expected {expected}")]
    ColumnCount { expected: usize, found: usize },

    #[error("Failed to create output directory '{0}'")]
    OutputDir(PathBuf, #[source] std::io::Error),

    #[error("Failed to create output file '{0}'")]
    CsvWriteIo(PathBuf, #[source] std::io::Error),

    #[error("Failed to write output CSV '{0}'")]
    CsvWritePolars(PathBuf, #[source] PolarsError),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),
}
