//! Wire shapes of the provider's JSON responses and their mapping into typed readings.
//!
//! Only the keys the pipeline needs are declared; anything else in the body is
//! ignored. A missing declared key is a [`PayloadError`], never a default value.

use crate::measurement::error::PayloadError;
use crate::types::readings::{AirQualityReading, WeatherReading};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct WeatherPayload {
    main: MainBlock,
    weather: Vec<ConditionBlock>,
    wind: WindBlock,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    main: String,
}

#[derive(Debug, Deserialize)]
struct WindBlock {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct AirPollutionPayload {
    list: Vec<AirPollutionEntry>,
}

#[derive(Debug, Deserialize)]
struct AirPollutionEntry {
    main: AqiBlock,
    components: Components,
}

#[derive(Debug, Deserialize)]
struct AqiBlock {
    aqi: i64,
}

#[derive(Debug, Deserialize)]
struct Components {
    co: f64,
    no: f64,
    no2: f64,
    o3: f64,
    so2: f64,
    pm2_5: f64,
    pm10: f64,
}

/// Parses a current-weather body. The first `weather` entry supplies the condition.
pub fn parse_weather(body: &str) -> Result<WeatherReading, PayloadError> {
    let payload: WeatherPayload = serde_json::from_str(body)?;
    let condition = payload
        .weather
        .into_iter()
        .next()
        .ok_or(PayloadError::EmptyList("weather"))?;
    Ok(WeatherReading {
        temperature: payload.main.temp,
        humidity: payload.main.humidity,
        condition: condition.main,
        wind_speed: payload.wind.speed,
    })
}

/// Parses an air-pollution body. The first `list` entry is treated as current.
pub fn parse_air_quality(body: &str) -> Result<AirQualityReading, PayloadError> {
    let payload: AirPollutionPayload = serde_json::from_str(body)?;
    let entry = payload
        .list
        .into_iter()
        .next()
        .ok_or(PayloadError::EmptyList("list"))?;
    let c = entry.components;
    Ok(AirQualityReading {
        aqi: entry.main.aqi,
        co: c.co,
        no: c.no,
        no2: c.no2,
        o3: c.o3,
        so2: c.so2,
        pm2_5: c.pm2_5,
        pm10: c.pm10,
    })
}
