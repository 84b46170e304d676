pub mod error;
pub mod openweather;
pub mod payload;

use crate::measurement::error::FetchError;
use crate::types::location::LatLon;
use crate::types::readings::{AirQualityReading, WeatherReading};
use async_trait::async_trait;

/// Read-only access to the measurement provider for one coordinate pair.
///
/// Implementations surface every failure as a [`FetchError`] and never
/// substitute placeholder readings.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    async fn fetch_weather(&self, coords: LatLon) -> Result<WeatherReading, FetchError>;

    async fn fetch_air_quality(&self, coords: LatLon) -> Result<AirQualityReading, FetchError>;
}
