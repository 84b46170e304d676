use crate::cleaner::error::CleanError;
use crate::config::ConfigError;
use crate::measurement::error::FetchError;
use crate::store::error::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Clean(#[from] CleanError),

    #[error("Failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
}
