//! Run configuration, built once at startup and passed by reference.
//!
//! Secrets (the provider credential and the store connection string) only come
//! from the environment. Everything else comes from an optional YAML file and
//! falls back to [`Settings::default`].

use crate::identity::normalize_location_name;
use crate::types::granularity::Granularity;
use crate::types::location::LocationConfig;
use crate::utils::default_config_path;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const API_KEY_VAR: &str = "OPENWEATHER_API_KEY";
pub const DATABASE_URL_VAR: &str = "WEATHER_DB_URL";
pub const CONFIG_PATH_VAR: &str = "WEATHER_INGEST_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("Failed to read config file '{0}'")]
    ReadFile(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file '{0}'")]
    ParseFile(PathBuf, #[source] serde_yaml::Error),

    #[error("No locations configured")]
    NoLocations,

    #[error("Location name must not be blank")]
    BlankLocationName,

    #[error("Location '{name}' has invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates {
        name: String,
        latitude: f64,
        longitude: f64,
    },

    #[error("Location '{0}' is configured more than once")]
    DuplicateLocation(String),

    #[error("fetch_concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("fetch_timeout_ms must be greater than 0")]
    InvalidTimeout,
}

/// What happens to the stored coordinates when a known location is observed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatePolicy {
    /// The first stored coordinates are kept.
    #[default]
    KeepExisting,
    /// The latest supplied coordinates replace the stored ones.
    Overwrite,
}

/// Non-secret settings, as read from the YAML file.
///
/// ```yaml
/// locations:
///   - { name: Hanoi, latitude: 21.0285, longitude: 105.8542 }
/// granularity: minute
/// coordinate_policy: keep_existing
/// fetch_timeout_ms: 10000
/// fetch_concurrency: 2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub locations: Vec<LocationConfig>,
    pub granularity: Granularity,
    pub coordinate_policy: CoordinatePolicy,
    pub fetch_timeout_ms: u64,
    pub fetch_concurrency: usize,
    pub store_busy_timeout_ms: u64,
    pub base_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            locations: vec![
                LocationConfig::new("Hanoi", 21.0285, 105.8542),
                LocationConfig::new("Danang", 16.0678, 108.2208),
            ],
            granularity: Granularity::default(),
            coordinate_policy: CoordinatePolicy::default(),
            fetch_timeout_ms: 10_000,
            fetch_concurrency: 1,
            store_busy_timeout_ms: 5_000,
            base_url: None,
        }
    }
}

impl Settings {
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.to_path_buf(), e))?;
        serde_yaml::from_str(&text).map_err(|e| ConfigError::ParseFile(path.to_path_buf(), e))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.locations.is_empty() {
            return Err(ConfigError::NoLocations);
        }
        let mut seen = HashSet::new();
        for location in &self.locations {
            let name = normalize_location_name(&location.name);
            if name.is_empty() {
                return Err(ConfigError::BlankLocationName);
            }
            if !location.coords().is_valid() {
                return Err(ConfigError::InvalidCoordinates {
                    name,
                    latitude: location.latitude,
                    longitude: location.longitude,
                });
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateLocation(name));
            }
        }
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// The validated configuration of one run.
#[derive(Clone)]
pub struct Config {
    api_key: String,
    database_url: Option<String>,
    pub settings: Settings,
}

impl Config {
    /// Builds a configuration from explicit values and validates it.
    pub fn new(
        api_key: impl Into<String>,
        database_url: Option<String>,
        settings: Settings,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingVar(API_KEY_VAR));
        }
        settings.validate()?;
        Ok(Self {
            api_key,
            database_url,
            settings,
        })
    }

    /// Reads secrets from the process environment.
    ///
    /// The settings file is `config_path` if given, else `$WEATHER_INGEST_CONFIG`,
    /// else the platform default path when that file exists.
    pub fn from_env(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::resolve(|name| std::env::var(name).ok(), config_path)
    }

    /// Same as [`Config::from_env`] with an injectable variable lookup.
    pub fn resolve<F>(lookup: F, config_path: Option<&Path>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let api_key = non_blank(API_KEY_VAR).ok_or(ConfigError::MissingVar(API_KEY_VAR))?;

        let file = config_path
            .map(Path::to_path_buf)
            .or_else(|| non_blank(CONFIG_PATH_VAR).map(PathBuf::from))
            .or_else(|| default_config_path().filter(|p| p.is_file()));

        let settings = match file {
            Some(path) => {
                log::info!("Loading settings from {}", path.display());
                Settings::from_yaml_file(&path)?
            }
            None => Settings::default(),
        };

        Self::new(api_key, non_blank(DATABASE_URL_VAR), settings)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The store connection string; required whenever the relational store is used.
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::MissingVar(DATABASE_URL_VAR))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.fetch_timeout_ms)
    }

    pub fn store_busy_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.store_busy_timeout_ms)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_resolve_defaults() -> Result<(), ConfigError> {
        let dir = tempfile::tempdir().unwrap();
        let empty_file = dir.path().join("empty.yaml");
        std::fs::write(&empty_file, "{}").unwrap();

        let config = Config::resolve(
            env(&[(API_KEY_VAR, "k"), (DATABASE_URL_VAR, "/tmp/obs.db")]),
            Some(&empty_file),
        )?;
        assert_eq!(config.api_key(), "k");
        assert_eq!(config.database_url()?, "/tmp/obs.db");
        assert_eq!(config.settings, Settings::default());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        Ok(())
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = Config::resolve(env(&[(API_KEY_VAR, "  ")]), None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(API_KEY_VAR)));
    }

    #[test]
    fn test_missing_database_url_is_reported_on_use() -> Result<(), ConfigError> {
        let config = Config::new("k", None, Settings::default())?;
        assert!(matches!(
            config.database_url(),
            Err(ConfigError::MissingVar(DATABASE_URL_VAR))
        ));
        Ok(())
    }

    #[test]
    fn test_yaml_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            "locations:\n  - {{ name: Hue, latitude: 16.4637, longitude: 107.5909 }}\n\
             granularity: second\ncoordinate_policy: overwrite\nfetch_concurrency: 3"
        )?;
        let config = Config::resolve(env(&[(API_KEY_VAR, "k")]), Some(file.path()))?;
        assert_eq!(config.settings.locations.len(), 1);
        assert_eq!(config.settings.locations[0].name, "Hue");
        assert_eq!(config.settings.granularity, Granularity::Second);
        assert_eq!(config.settings.coordinate_policy, CoordinatePolicy::Overwrite);
        assert_eq!(config.settings.fetch_concurrency, 3);
        assert_eq!(config.settings.fetch_timeout_ms, 10_000);
        Ok(())
    }

    #[test]
    fn test_yaml_file_via_env_var() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "fetch_timeout_ms: 250")?;
        let path = file.path().to_string_lossy().to_string();
        let config = Config::resolve(env(&[(API_KEY_VAR, "k"), (CONFIG_PATH_VAR, path.as_str())]), None)?;
        assert_eq!(config.fetch_timeout(), Duration::from_millis(250));
        Ok(())
    }

    #[test]
    fn test_unknown_keys_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "granularty: minute")?;
        let err = Config::resolve(env(&[(API_KEY_VAR, "k")]), Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ParseFile(..)));
        Ok(())
    }

    #[test]
    fn test_duplicate_names_after_normalization() {
        let settings = Settings {
            locations: vec![
                LocationConfig::new("Hanoi", 21.0285, 105.8542),
                LocationConfig::new(" hanoi", 21.03, 105.85),
            ],
            ..Settings::default()
        };
        let err = Config::new("k", None, settings).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateLocation(name) if name == "Hanoi"));
    }

    #[test]
    fn test_invalid_settings() {
        let bad_coords = Settings {
            locations: vec![LocationConfig::new("Nowhere", 123.0, 0.0)],
            ..Settings::default()
        };
        assert!(matches!(
            Config::new("k", None, bad_coords),
            Err(ConfigError::InvalidCoordinates { .. })
        ));

        let no_locations = Settings {
            locations: vec![],
            ..Settings::default()
        };
        assert!(matches!(
            Config::new("k", None, no_locations),
            Err(ConfigError::NoLocations)
        ));

        let zero_concurrency = Settings {
            fetch_concurrency: 0,
            ..Settings::default()
        };
        assert!(matches!(
            Config::new("k", None, zero_concurrency),
            Err(ConfigError::InvalidConcurrency)
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() -> Result<(), ConfigError> {
        let config = Config::new("very-secret", Some("postgres://u:p@h/db".into()), Settings::default())?;
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("u:p@h"));
        Ok(())
    }
}
