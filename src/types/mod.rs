pub mod granularity;
pub mod location;
pub mod observation;
pub mod readings;
