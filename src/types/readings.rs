//! Typed readings as returned by the measurement provider, before normalization.

/// Current conditions for one coordinate pair, in metric units.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReading {
    /// Air temperature in °C.
    pub temperature: f64,
    /// Relative humidity in %.
    pub humidity: f64,
    /// Provider-controlled condition label, e.g. `"Clouds"`.
    pub condition: String,
    /// Wind speed in m/s.
    pub wind_speed: f64,
}

/// Current air composition for one coordinate pair.
///
/// Concentrations are in μg/m³, `aqi` is the provider's ordinal index.
#[derive(Debug, Clone, PartialEq)]
pub struct AirQualityReading {
    pub aqi: i64,
    pub co: f64,
    pub no: f64,
    pub no2: f64,
    pub o3: f64,
    pub so2: f64,
    pub pm2_5: f64,
    pub pm10: f64,
}
