use crate::store::error::StoreError;
use crate::store::{FactWrite, ObservationSink, StoreReceipt};
use crate::types::observation::Observation;
use crate::utils::ensure_parent_dir_exists;
use log::debug;
use polars::prelude::*;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Written in place of any value that was absent or unusable.
pub const MISSING_MARKER: &str = "N/A";

/// Header of the append-only file, in column order.
pub const SINK_COLUMNS: [&str; 14] = [
    "timestamp",
    "location",
    "temperature",
    "humidity",
    "condition",
    "windSpeed",
    "aqi",
    "co",
    "no",
    "no2",
    "o3",
    "so2",
    "pm2_5",
    "pm10",
];

/// Appends one row per observation to a delimited file.
///
/// Unlike [`crate::SqliteStore`] this sink makes no deduplication promise:
/// recording the same observation twice yields two rows. The Batch Cleaner
/// reconciles such a file afterwards.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn row_values(observation: &Observation) -> [String; 14] {
        let weather = observation.weather.clone().unwrap_or_default();
        let air = observation.air_quality.clone().unwrap_or_default();
        [
            observation.key.timestamp_text(),
            observation.key.location.clone(),
            render(weather.temperature),
            render(weather.humidity),
            weather
                .condition
                .unwrap_or_else(|| MISSING_MARKER.to_string()),
            render(weather.wind_speed),
            render(air.aqi),
            render(air.co),
            render(air.no),
            render(air.no2),
            render(air.o3),
            render(air.so2),
            render(air.pm2_5),
            render(air.pm10),
        ]
    }

    fn row_frame(observation: &Observation) -> PolarsResult<DataFrame> {
        let columns = SINK_COLUMNS
            .iter()
            .zip(Self::row_values(observation))
            .map(|(name, value)| Column::new((*name).into(), vec![value]))
            .collect();
        DataFrame::new(columns)
    }
}

fn render<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| MISSING_MARKER.to_string())
}

impl ObservationSink for CsvFileSink {
    fn record(&mut self, observation: &Observation) -> Result<StoreReceipt, StoreError> {
        ensure_parent_dir_exists(&self.path)
            .map_err(|e| StoreError::CsvIo(self.path.clone(), e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::CsvIo(self.path.clone(), e))?;
        let is_empty = file
            .metadata()
            .map_err(|e| StoreError::CsvIo(self.path.clone(), e))?
            .len()
            == 0;

        let mut df = Self::row_frame(observation)
            .map_err(|e| StoreError::CsvEncode(self.path.clone(), e))?;
        CsvWriter::new(&mut file)
            .include_header(is_empty)
            .finish(&mut df)
            .map_err(|e| StoreError::CsvEncode(self.path.clone(), e))?;
        debug!("Appended {} to {:?}", observation.key, self.path);

        let outcome = |present: bool| {
            if present {
                FactWrite::Inserted
            } else {
                FactWrite::Unavailable
            }
        };
        Ok(StoreReceipt {
            location_id: None,
            weather: outcome(observation.weather.is_some()),
            air_quality: outcome(observation.air_quality.is_some()),
        })
    }
}
