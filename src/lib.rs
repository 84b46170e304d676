mod cleaner;
mod config;
mod error;
mod identity;
mod ingest;
mod measurement;
mod store;
mod types;
mod utils;

pub use error::IngestError;

pub use config::*;
pub use identity::*;
pub use ingest::*;

pub use measurement::error::{Endpoint, FetchError, PayloadError};
pub use measurement::openweather::{OpenWeatherClient, DEFAULT_BASE_URL};
pub use measurement::payload::{parse_air_quality, parse_weather};
pub use measurement::MeasurementSource;

pub use store::csv_sink::*;
pub use store::error::{FactKind, StoreError};
pub use store::sqlite_store::*;
pub use store::{FactWrite, ObservationSink, StoreReceipt};

pub use cleaner::clean::*;
pub use cleaner::csv_io::*;
pub use cleaner::error::CleanError;

pub use types::granularity::Granularity;
pub use types::location::{LatLon, LocationConfig, LocationId};
pub use types::observation::*;
pub use types::readings::{AirQualityReading, WeatherReading};

pub use utils::{default_config_path, error_chain};
