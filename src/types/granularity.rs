//! Defines the `Granularity` used to quantize observation timestamps before they
//! become part of a fact's identity key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The bucket size an observation timestamp is truncated to.
///
/// Two instants that fall into the same bucket produce the same quantized
/// timestamp, and therefore the same fact key. Changing the granularity between
/// runs changes which writes are treated as duplicates, so a deployment should
/// pick one value and keep it.
///
/// The default is [`Granularity::Minute`].
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use weather_ingest::Granularity;
///
/// let at = Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 42).unwrap();
/// let quantized = Granularity::Minute.quantize(at);
/// assert_eq!(quantized, Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Drop sub-second precision.
    Second,
    /// Drop sub-minute precision.
    #[default]
    Minute,
    /// Drop sub-hour precision.
    Hour,
}

impl Granularity {
    fn bucket_seconds(&self) -> i64 {
        match self {
            Granularity::Second => 1,
            Granularity::Minute => 60,
            Granularity::Hour => 3_600,
        }
    }

    /// Truncates `at` to the start of its bucket.
    ///
    /// This is a pure function of `at` and `self`; it never looks at the clock.
    pub fn quantize(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let seconds = at.timestamp();
        let floored = seconds - seconds.rem_euclid(self.bucket_seconds());
        // floored <= seconds, and both lie inside chrono's supported range
        DateTime::from_timestamp(floored, 0).unwrap_or(at)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Second => "second",
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32, s: u32, micros: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, h, m, s).unwrap() + Duration::microseconds(micros)
    }

    #[test]
    fn test_second_drops_fraction() {
        assert_eq!(
            Granularity::Second.quantize(at(7, 15, 42, 987_654)),
            at(7, 15, 42, 0)
        );
    }

    #[test]
    fn test_minute_drops_seconds() {
        assert_eq!(
            Granularity::Minute.quantize(at(7, 15, 42, 987_654)),
            at(7, 15, 0, 0)
        );
    }

    #[test]
    fn test_hour_drops_minutes() {
        assert_eq!(Granularity::Hour.quantize(at(23, 59, 59, 999_999)), at(23, 0, 0, 0));
    }

    #[test]
    fn test_same_bucket_same_result() {
        let first = at(10, 30, 0, 0);
        for offset in [0_i64, 1, 15_000_000, 59_999_999] {
            let other = first + Duration::microseconds(offset);
            assert_eq!(
                Granularity::Minute.quantize(first),
                Granularity::Minute.quantize(other),
                "offset {}us should stay in the same minute",
                offset
            );
        }
        let next = first + Duration::seconds(60);
        assert_ne!(
            Granularity::Minute.quantize(first),
            Granularity::Minute.quantize(next)
        );
    }

    #[test]
    fn test_quantize_is_idempotent() {
        let raw = at(4, 44, 44, 444);
        for g in [Granularity::Second, Granularity::Minute, Granularity::Hour] {
            let once = g.quantize(raw);
            assert_eq!(g.quantize(once), once);
        }
    }

    #[test]
    fn test_pre_epoch_floors_downwards() {
        let raw = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 30).unwrap();
        assert_eq!(
            Granularity::Minute.quantize(raw),
            Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 0).unwrap()
        );
    }

    #[test]
    fn test_serde_names() {
        let parsed: Granularity = serde_yaml::from_str("hour").unwrap();
        assert_eq!(parsed, Granularity::Hour);
        assert_eq!(Granularity::default(), Granularity::Minute);
        assert_eq!(Granularity::Second.to_string(), "second");
    }
}
