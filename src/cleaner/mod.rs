//! Offline Batch Cleaner: turns the append-only file written by
//! [`crate::CsvFileSink`] into deduplicated weather and air-quality files.

pub mod clean;
pub mod csv_io;
pub mod error;
