//! Normalized facts and the identity key they are stored under.

use crate::types::location::LatLon;
use chrono::{DateTime, Utc};
use std::fmt;

/// Text layout of a quantized timestamp as stored in the `observed_at` columns.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Identity of one observation: a normalized location name and a quantized
/// UTC timestamp.
///
/// Built by [`crate::build_key`]; constructing it by hand skips normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservationKey {
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

impl ObservationKey {
    /// The quantized timestamp rendered with [`TIMESTAMP_FORMAT`].
    pub fn timestamp_text(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

impl fmt::Display for ObservationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.location, self.timestamp_text())
    }
}

/// A normalized weather fact. `None` marks a value that was absent or unusable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeatherFact {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub condition: Option<String>,
    pub wind_speed: Option<f64>,
}

/// A normalized air-quality fact. `None` marks a value that was absent or unusable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AirQualityFact {
    /// Ordinal index, 1 (good) to 5 (very poor).
    pub aqi: Option<u8>,
    pub co: Option<f64>,
    pub no: Option<f64>,
    pub no2: Option<f64>,
    pub o3: Option<f64>,
    pub so2: Option<f64>,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
}

/// One location's observation for one quantized timestamp.
///
/// A fact is `None` when its fetch failed during the cycle; the other fact is
/// still persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub key: ObservationKey,
    pub coords: LatLon,
    pub weather: Option<WeatherFact>,
    pub air_quality: Option<AirQualityFact>,
}
