//! Geographical types shared by the measurement client, the configuration and
//! the reconciliation store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
///
/// # Examples
///
/// ```
/// use weather_ingest::LatLon;
///
/// let hanoi = LatLon(21.0285, 105.8542);
/// assert_eq!(hanoi.0, 21.0285); // Latitude
/// assert_eq!(hanoi.1, 105.8542); // Longitude
/// assert!(hanoi.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon(pub f64, pub f64);

impl LatLon {
    /// Whether both components are finite and inside the WGS-84 ranges.
    pub fn is_valid(&self) -> bool {
        self.0.is_finite()
            && self.1.is_finite()
            && (-90.0..=90.0).contains(&self.0)
            && (-180.0..=180.0).contains(&self.1)
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

/// A named point of observation, as listed in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Human label, e.g. `"Hanoi"`. Normalized before it is used as an identity.
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationConfig {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    pub fn coords(&self) -> LatLon {
        LatLon(self.latitude, self.longitude)
    }
}

/// Surrogate key of a row in the `locations` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationId(pub i64);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_lon_validity() {
        assert!(LatLon(16.0678, 108.2208).is_valid());
        assert!(LatLon(-90.0, 180.0).is_valid());
        assert!(!LatLon(90.5, 0.0).is_valid());
        assert!(!LatLon(0.0, -181.0).is_valid());
        assert!(!LatLon(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_location_config_coords() {
        let danang = LocationConfig::new("Danang", 16.0678, 108.2208);
        assert_eq!(danang.coords(), LatLon(16.0678, 108.2208));
        assert_eq!(danang.coords().to_string(), "(16.0678, 108.2208)");
    }
}
