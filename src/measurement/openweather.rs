//! `reqwest`-backed [`MeasurementSource`] for OpenWeather-compatible providers.

use crate::error::IngestError;
use crate::measurement::error::{Endpoint, FetchError};
use crate::measurement::payload::{parse_air_quality, parse_weather};
use crate::measurement::MeasurementSource;
use crate::types::location::LatLon;
use crate::types::readings::{AirQualityReading, WeatherReading};
use async_trait::async_trait;
use bon::bon;
use log::{debug, warn};
use reqwest::Client;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";
const API_PATH: &str = "data/2.5";

/// Reads current weather and air composition from the provider.
///
/// Each call performs exactly one request and does not retry; timeouts and
/// retry policy belong to the caller.
pub struct OpenWeatherClient {
    http: Client,
    base_url: String,
    api_key: String,
}

#[bon]
impl OpenWeatherClient {
    /// Creates a client.
    ///
    /// # Arguments
    ///
    /// * `.api_key(String)`: **Required.** The provider access credential.
    /// * `.base_url(String)`: Optional. Defaults to [`DEFAULT_BASE_URL`].
    /// * `.connect_timeout(Duration)`: Optional. TCP/TLS connect bound, defaults to 5 seconds.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::HttpClient`] if the TLS backend cannot be initialised.
    #[builder]
    pub fn new(
        #[builder(into)] api_key: String,
        #[builder(into)] base_url: Option<String>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, IngestError> {
        let http = Client::builder()
            .connect_timeout(connect_timeout.unwrap_or(Duration::from_secs(5)))
            .build()
            .map_err(IngestError::HttpClient)?;
        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }

    fn endpoint_url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}/{}", self.base_url, API_PATH, endpoint.path_segment())
    }

    /// Sends one GET and returns the body of a 2xx response.
    async fn get_body(&self, endpoint: Endpoint, coords: LatLon) -> Result<String, FetchError> {
        let url = self.endpoint_url(endpoint);
        debug!("Requesting {} for {}", url, coords);

        let mut request = self.http.get(&url).query(&[
            ("lat", coords.0.to_string()),
            ("lon", coords.1.to_string()),
            ("appid", self.api_key.clone()),
        ]);
        if endpoint == Endpoint::Weather {
            request = request.query(&[("units", "metric")]);
        }

        // The full request URL carries the key, so it is stripped from reqwest errors
        let response = request.send().await.map_err(|e| FetchError::Network {
            endpoint,
            source: e.without_url(),
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("HTTP error for {} at {}: {}", endpoint, coords, status);
            return Err(FetchError::HttpStatus { endpoint, status });
        }

        response.text().await.map_err(|e| FetchError::Network {
            endpoint,
            source: e.without_url(),
        })
    }
}

#[async_trait]
impl MeasurementSource for OpenWeatherClient {
    async fn fetch_weather(&self, coords: LatLon) -> Result<WeatherReading, FetchError> {
        let endpoint = Endpoint::Weather;
        let body = self.get_body(endpoint, coords).await?;
        parse_weather(&body).map_err(|source| FetchError::Malformed { endpoint, source })
    }

    async fn fetch_air_quality(&self, coords: LatLon) -> Result<AirQualityReading, FetchError> {
        let endpoint = Endpoint::AirPollution;
        let body = self.get_body(endpoint, coords).await?;
        parse_air_quality(&body).map_err(|source| FetchError::Malformed { endpoint, source })
    }
}

impl fmt::Debug for OpenWeatherClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenWeatherClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
