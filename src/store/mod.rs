pub mod csv_sink;
pub mod error;
pub mod sqlite_store;

use crate::store::error::StoreError;
use crate::types::location::LocationId;
use crate::types::observation::Observation;
use std::fmt;

/// Result of one fact write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactWrite {
    /// The key was absent and the fact is now recorded.
    Inserted,
    /// The key was already recorded; the write was discarded.
    AlreadyRecorded,
    /// The observation carried no fact of this kind.
    Unavailable,
}

impl fmt::Display for FactWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FactWrite::Inserted => "inserted",
            FactWrite::AlreadyRecorded => "already recorded",
            FactWrite::Unavailable => "unavailable",
        };
        write!(f, "{}", text)
    }
}

/// What a sink did with one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreReceipt {
    /// `None` for sinks without a location table.
    pub location_id: Option<LocationId>,
    pub weather: FactWrite,
    pub air_quality: FactWrite,
}

/// Durable destination for observations.
pub trait ObservationSink {
    fn record(&mut self, observation: &Observation) -> Result<StoreReceipt, StoreError>;
}
