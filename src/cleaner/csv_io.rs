use crate::cleaner::clean::{
    clean_frame, empty_raw_frame, CleanStats, DATETIME_FORMAT, RAW_COLUMNS,
};
use crate::cleaner::error::CleanError;
use chrono::NaiveDateTime;
use log::{info, warn};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Layout of the generation stamp in output file names.
const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Paths written by [`run_clean_split`] and what the cleaner did.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanSplitReport {
    pub weather_path: PathBuf,
    pub air_quality_path: PathBuf,
    pub stats: CleanStats,
}

/// Reads a header-less raw file, every cell as text, and names its columns.
///
/// Quoted cells (such as a condition containing a comma) are unquoted by the
/// reader. An empty file yields an empty frame with the raw schema.
pub fn read_raw_csv(path: &Path) -> Result<DataFrame, CleanError> {
    let len = std::fs::metadata(path)
        .map_err(|e| CleanError::ReadIo {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();
    if len == 0 {
        warn!("Raw file {:?} is empty", path);
        return Ok(empty_raw_frame()?);
    }

    let mut df = CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| CleanError::CsvRead {
            path: path.to_path_buf(),
            source: e,
        })?
        .finish()
        .map_err(|e| CleanError::CsvRead {
            path: path.to_path_buf(),
            source: e,
        })?;

    if df.width() != RAW_COLUMNS.len() {
        warn!(
            "Raw file {:?} has {} columns, expected {}",
            path,
            df.width(),
            RAW_COLUMNS.len()
        );
        return Err(CleanError::SchemaMismatch {
            path: path.to_path_buf(),
            expected: RAW_COLUMNS.len(),
            found: df.width(),
        });
    }
    df.set_column_names(RAW_COLUMNS)?;
    Ok(df)
}

/// Writes a cleaned frame with a header row. Datetimes use [`DATETIME_FORMAT`].
pub fn write_clean_csv(path: &Path, df: &mut DataFrame) -> Result<(), CleanError> {
    let mut file =
        File::create(path).map_err(|e| CleanError::CsvWriteIo(path.to_path_buf(), e))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_datetime_format(Some(DATETIME_FORMAT.to_string()))
        .finish(df)
        .map_err(|e| CleanError::CsvWritePolars(path.to_path_buf(), e))
}

/// Output file paths for a run generated at `generated_at`.
pub fn output_paths(output_dir: &Path, generated_at: NaiveDateTime) -> (PathBuf, PathBuf) {
    let stamp = generated_at.format(FILE_STAMP_FORMAT);
    (
        output_dir.join(format!("weather_data_clean_{}.csv", stamp)),
        output_dir.join(format!("air_quality_data_clean_{}.csv", stamp)),
    )
}

/// Reads `input`, cleans it and writes the two split files into `output_dir`.
///
/// # Errors
///
/// Returns [`CleanError::ReadIo`] or [`CleanError::CsvRead`] when the input cannot
/// be read, [`CleanError::SchemaMismatch`] when it does not have 14 columns, and
/// the write variants when an output file cannot be produced.
pub fn run_clean_split(
    input: &Path,
    output_dir: &Path,
    generated_at: NaiveDateTime,
) -> Result<CleanSplitReport, CleanError> {
    let raw = read_raw_csv(input)?;
    let mut output = clean_frame(raw)?;

    std::fs::create_dir_all(output_dir)
        .map_err(|e| CleanError::OutputDir(output_dir.to_path_buf(), e))?;
    let (weather_path, air_quality_path) = output_paths(output_dir, generated_at);
    write_clean_csv(&weather_path, &mut output.weather)?;
    write_clean_csv(&air_quality_path, &mut output.air_quality)?;

    let stats = output.stats;
    info!(
        "Cleaned {} raw rows into {} ({} empty, {} bad timestamps, {} without city, {} duplicates)",
        stats.input_rows,
        stats.output_rows,
        stats.empty_rows,
        stats.bad_timestamps,
        stats.missing_city,
        stats.duplicates
    );
    info!("Wrote {:?} and {:?}", weather_path, air_quality_path);

    Ok(CleanSplitReport {
        weather_path,
        air_quality_path,
        stats,
    })
}
