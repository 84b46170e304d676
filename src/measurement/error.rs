use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The two read endpoints of the measurement provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Weather,
    AirPollution,
}

impl Endpoint {
    pub(crate) fn path_segment(&self) -> &'static str {
        match self {
            Endpoint::Weather => "weather",
            Endpoint::AirPollution => "air_pollution",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_segment())
    }
}

/// The provider answered, but the body does not have the expected shape.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Failed to parse JSON body")]
    Json(#[from] serde_json::Error),

    #[error("Expected at least one entry in '{0}'")]
    EmptyList(&'static str),
}

/// A failed read against the measurement provider.
///
/// Messages carry the endpoint name but never the request URL, which contains
/// the access credential.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network request to the {endpoint} endpoint failed")]
    Network {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },

    #[error("The {endpoint} endpoint responded with status {status}")]
    HttpStatus {
        endpoint: Endpoint,
        status: StatusCode,
    },

    #[error("Malformed payload from the {endpoint} endpoint")]
    Malformed {
        endpoint: Endpoint,
        #[source]
        source: PayloadError,
    },

    #[error("Request to the {endpoint} endpoint timed out after {after:?}")]
    TimedOut { endpoint: Endpoint, after: Duration },
}

impl FetchError {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            FetchError::Network { endpoint, .. }
            | FetchError::HttpStatus { endpoint, .. }
            | FetchError::Malformed { endpoint, .. }
            | FetchError::TimedOut { endpoint, .. } => *endpoint,
        }
    }
}
