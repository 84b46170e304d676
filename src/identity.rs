//! Identity derivation and normalization.
//!
//! Everything here is pure: the same inputs always produce the same key and
//! the same facts, whatever order the two provider calls finished in.

use crate::types::granularity::Granularity;
use crate::types::location::LocationConfig;
use crate::types::observation::{AirQualityFact, Observation, ObservationKey, WeatherFact};
use crate::types::readings::{AirQualityReading, WeatherReading};
use chrono::{DateTime, Utc};

const AQI_RANGE: std::ops::RangeInclusive<i64> = 1..=5;

/// Upper-cases the first letter of every alphabetic run and lower-cases the rest.
///
/// `"ho chi MINH"` becomes `"Ho Chi Minh"`.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_word = false;
    for c in value.chars() {
        if in_word {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        in_word = c.is_alphabetic();
    }
    out
}

/// Canonical form of a location label: trimmed, then title-cased.
///
/// # Examples
///
/// ```
/// use weather_ingest::normalize_location_name;
///
/// assert_eq!(normalize_location_name(" hanoi "), "Hanoi");
/// assert_eq!(normalize_location_name("HANOI"), "Hanoi");
/// ```
pub fn normalize_location_name(raw: &str) -> String {
    title_case(raw.trim())
}

/// Builds the identity key of an observation.
///
/// `observed_at` must be sampled once per cycle, before either fetch starts.
pub fn build_key(
    location_name: &str,
    observed_at: DateTime<Utc>,
    granularity: Granularity,
) -> ObservationKey {
    ObservationKey {
        location: normalize_location_name(location_name),
        timestamp: granularity.quantize(observed_at),
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn concentration(value: f64) -> Option<f64> {
    finite(value).filter(|v| *v >= 0.0)
}

pub fn normalize_weather(reading: WeatherReading) -> WeatherFact {
    let condition = reading.condition.trim();
    WeatherFact {
        temperature: finite(reading.temperature),
        humidity: finite(reading.humidity).filter(|h| (0.0..=100.0).contains(h)),
        condition: (!condition.is_empty()).then(|| condition.to_string()),
        wind_speed: finite(reading.wind_speed).filter(|w| *w >= 0.0),
    }
}

pub fn normalize_air_quality(reading: AirQualityReading) -> AirQualityFact {
    AirQualityFact {
        aqi: AQI_RANGE
            .contains(&reading.aqi)
            .then(|| reading.aqi as u8),
        co: concentration(reading.co),
        no: concentration(reading.no),
        no2: concentration(reading.no2),
        o3: concentration(reading.o3),
        so2: concentration(reading.so2),
        pm2_5: concentration(reading.pm2_5),
        pm10: concentration(reading.pm10),
    }
}

/// Assembles the observation for one cycle. A `None` reading stays `None`: the
/// corresponding fact is unavailable, not zero.
pub fn build_observation(
    location: &LocationConfig,
    observed_at: DateTime<Utc>,
    granularity: Granularity,
    weather: Option<WeatherReading>,
    air_quality: Option<AirQualityReading>,
) -> Observation {
    Observation {
        key: build_key(&location.name, observed_at, granularity),
        coords: location.coords(),
        weather: weather.map(normalize_weather),
        air_quality: air_quality.map(normalize_air_quality),
    }
}
