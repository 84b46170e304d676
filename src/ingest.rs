//! One ingestion pass: for every configured location, fetch both facts
//! concurrently, build the observation and hand it to the sink.

use crate::config::Config;
use crate::identity::{build_observation, normalize_location_name};
use crate::measurement::error::{Endpoint, FetchError};
use crate::measurement::MeasurementSource;
use crate::store::error::StoreError;
use crate::store::{ObservationSink, StoreReceipt};
use crate::types::location::{LatLon, LocationConfig};
use crate::types::readings::{AirQualityReading, WeatherReading};
use crate::utils::error_chain;
use bon::bon;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use log::{error, info, warn};
use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;

/// The step of a cycle at which something went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchWeather,
    FetchAirQuality,
    Store,
}

impl From<Endpoint> for Stage {
    fn from(endpoint: Endpoint) -> Self {
        match endpoint {
            Endpoint::Weather => Stage::FetchWeather,
            Endpoint::AirPollution => Stage::FetchAirQuality,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::FetchWeather => write!(f, "fetch weather"),
            Stage::FetchAirQuality => write!(f, "fetch air quality"),
            Stage::Store => write!(f, "store"),
        }
    }
}

/// How a single location's cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Both facts fetched and handed to the sink.
    Complete(StoreReceipt),
    /// One fetch failed; the other fact was still stored.
    Partial {
        receipt: StoreReceipt,
        failure: FetchError,
    },
    /// Both fetches failed; nothing was stored.
    FetchFailed {
        weather: FetchError,
        air_quality: FetchError,
    },
    /// The sink rejected the observation; nothing of it was committed.
    StoreFailed(StoreError),
}

impl CycleOutcome {
    /// The stage that failed first, or `None` for a complete cycle.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            CycleOutcome::Complete(_) => None,
            CycleOutcome::Partial { failure, .. } => Some(failure.endpoint().into()),
            CycleOutcome::FetchFailed { .. } => Some(Stage::FetchWeather),
            CycleOutcome::StoreFailed(_) => Some(Stage::Store),
        }
    }

    pub fn receipt(&self) -> Option<&StoreReceipt> {
        match self {
            CycleOutcome::Complete(receipt) | CycleOutcome::Partial { receipt, .. } => {
                Some(receipt)
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct CycleReport {
    /// Normalized location name.
    pub location: String,
    pub outcome: CycleOutcome,
}

/// Result of one pass over all configured locations.
#[derive(Debug)]
pub struct PassSummary {
    /// The instant sampled before any fetch of the pass started.
    pub observed_at: DateTime<Utc>,
    /// One report per location that was processed, in configuration order.
    pub reports: Vec<CycleReport>,
    /// Whether the pass stopped early on cancellation.
    pub cancelled: bool,
}

impl PassSummary {
    pub fn complete(&self) -> usize {
        self.count(|o| matches!(o, CycleOutcome::Complete(_)))
    }

    pub fn partial(&self) -> usize {
        self.count(|o| matches!(o, CycleOutcome::Partial { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                CycleOutcome::FetchFailed { .. } | CycleOutcome::StoreFailed(_)
            )
        })
    }

    pub fn report_for(&self, name: &str) -> Option<&CycleReport> {
        let name = normalize_location_name(name);
        self.reports.iter().find(|r| r.location == name)
    }

    fn count(&self, predicate: impl Fn(&CycleOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

/// Drives ingestion passes from a [`MeasurementSource`] into an [`ObservationSink`].
///
/// # Examples
///
/// ```no_run
/// # use weather_ingest::{Config, Ingestor, IngestError, OpenWeatherClient, SqliteStore};
/// # use tokio_util::sync::CancellationToken;
/// # async fn run() -> Result<(), IngestError> {
/// let config = Config::from_env(None)?;
/// let client = OpenWeatherClient::builder().api_key(config.api_key()).build()?;
/// let store = SqliteStore::open(
///     config.database_url()?,
///     config.settings.coordinate_policy,
///     config.store_busy_timeout(),
/// )?;
///
/// let mut ingestor = Ingestor::builder()
///     .source(client)
///     .sink(store)
///     .config(&config)
///     .build();
/// let summary = ingestor.run_pass(&CancellationToken::new()).await;
/// println!("{} complete, {} partial", summary.complete(), summary.partial());
/// # Ok(())
/// # }
/// ```
pub struct Ingestor<'a, S, K> {
    source: S,
    sink: K,
    config: &'a Config,
}

#[bon]
impl<'a, S: MeasurementSource, K: ObservationSink> Ingestor<'a, S, K> {
    #[builder]
    pub fn new(source: S, sink: K, config: &'a Config) -> Self {
        Self {
            source,
            sink,
            config,
        }
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Runs one pass stamped with the current time.
    pub async fn run_pass(&mut self, cancel: &CancellationToken) -> PassSummary {
        self.run_pass_at(Utc::now(), cancel).await
    }

    /// Runs one pass with every observation keyed at `observed_at`.
    ///
    /// Per-location failures are reported in the summary and never abort the
    /// pass. Cancellation stops the pass before the next location is stored;
    /// already committed cycles are unaffected.
    pub async fn run_pass_at(
        &mut self,
        observed_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> PassSummary {
        let config = self.config;
        let source = &self.source;
        let sink = &mut self.sink;
        let limit = config.fetch_timeout();

        info!(
            "Starting pass for {} location(s) at {}",
            config.settings.locations.len(),
            observed_at
        );

        let mut fetches = pin!(stream::iter(config.settings.locations.iter())
            .map(|location| async move {
                let (weather, air_quality) = fetch_both(source, location.coords(), limit).await;
                (location, weather, air_quality)
            })
            .buffered(config.settings.fetch_concurrency));

        let mut reports = Vec::with_capacity(config.settings.locations.len());
        let mut cancelled = false;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = fetches.next() => next,
            };
            let Some((location, weather, air_quality)) = next else {
                break;
            };
            reports.push(complete_cycle(
                sink,
                location,
                observed_at,
                config,
                weather,
                air_quality,
            ));
        }

        let summary = PassSummary {
            observed_at,
            reports,
            cancelled,
        };
        if cancelled {
            warn!(
                "Pass cancelled after {} of {} location(s)",
                summary.reports.len(),
                config.settings.locations.len()
            );
        }
        info!(
            "Pass finished: {} complete, {} partial, {} failed",
            summary.complete(),
            summary.partial(),
            summary.failed()
        );
        summary
    }
}

async fn bounded<T>(
    endpoint: Endpoint,
    limit: Duration,
    fetch: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    tokio::time::timeout(limit, fetch)
        .await
        .unwrap_or_else(|_| {
            Err(FetchError::TimedOut {
                endpoint,
                after: limit,
            })
        })
}

/// Runs a synchronous sink write from async code.
///
/// Sink writes (a SQLite transaction or a CSV append) block the calling thread.
/// On a multi-threaded runtime the worker is handed to the scheduler first, so
/// the Ctrl+C watcher and in-flight fetches keep running. A current-thread
/// runtime has nothing to hand over and runs the write inline; a pass stores
/// one location at a time either way.
fn write_blocking<T>(write: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(write)
        }
        _ => write(),
    }
}

/// Both reads of a cycle, run concurrently. Neither depends on the other.
async fn fetch_both<S: MeasurementSource>(
    source: &S,
    coords: LatLon,
    limit: Duration,
) -> (
    Result<WeatherReading, FetchError>,
    Result<AirQualityReading, FetchError>,
) {
    tokio::join!(
        bounded(Endpoint::Weather, limit, source.fetch_weather(coords)),
        bounded(Endpoint::AirPollution, limit, source.fetch_air_quality(coords)),
    )
}

fn complete_cycle<K: ObservationSink>(
    sink: &mut K,
    location: &LocationConfig,
    observed_at: DateTime<Utc>,
    config: &Config,
    weather: Result<WeatherReading, FetchError>,
    air_quality: Result<AirQualityReading, FetchError>,
) -> CycleReport {
    let name = normalize_location_name(&location.name);
    let (weather, air_quality, failure) = match (weather, air_quality) {
        (Ok(w), Ok(a)) => (Some(w), Some(a), None),
        (Ok(w), Err(e)) => (Some(w), None, Some(e)),
        (Err(e), Ok(a)) => (None, Some(a), Some(e)),
        (Err(weather), Err(air_quality)) => {
            warn!(
                "{}: {} failed: {}",
                name,
                Stage::FetchWeather,
                error_chain(&weather)
            );
            warn!(
                "{}: {} failed: {}",
                name,
                Stage::FetchAirQuality,
                error_chain(&air_quality)
            );
            return CycleReport {
                location: name,
                outcome: CycleOutcome::FetchFailed {
                    weather,
                    air_quality,
                },
            };
        }
    };

    let observation = build_observation(
        location,
        observed_at,
        config.settings.granularity,
        weather,
        air_quality,
    );

    let outcome = match write_blocking(|| sink.record(&observation)) {
        Ok(receipt) => match failure {
            None => {
                info!(
                    "{}: weather {}, air quality {}",
                    observation.key, receipt.weather, receipt.air_quality
                );
                CycleOutcome::Complete(receipt)
            }
            Some(failure) => {
                warn!(
                    "{}: {} failed, stored the rest (weather {}, air quality {}): {}",
                    observation.key,
                    Stage::from(failure.endpoint()),
                    receipt.weather,
                    receipt.air_quality,
                    error_chain(&failure)
                );
                CycleOutcome::Partial { receipt, failure }
            }
        },
        Err(e) => {
            error!(
                "{}: {} failed: {}",
                observation.key,
                Stage::Store,
                error_chain(&e)
            );
            CycleOutcome::StoreFailed(e)
        }
    };

    CycleReport {
        location: name,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoordinatePolicy, Settings};
    use crate::store::csv_sink::CsvFileSink;
    use crate::store::sqlite_store::SqliteStore;
    use crate::store::FactWrite;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HANOI: LatLon = LatLon(21.0285, 105.8542);

    #[derive(Clone, Copy)]
    enum Reply {
        Ok,
        Status(StatusCode),
        Hang,
    }

    struct FakeSource {
        weather: Reply,
        air_quality: Reply,
        /// Coordinates for which both endpoints fail.
        broken: Option<LatLon>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(weather: Reply, air_quality: Reply) -> Self {
            Self {
                weather,
                air_quality,
                broken: None,
                calls: AtomicUsize::new(0),
            }
        }

        async fn reply<T>(
            &self,
            reply: Reply,
            endpoint: Endpoint,
            coords: LatLon,
            value: T,
        ) -> Result<T, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken == Some(coords) {
                return Err(FetchError::HttpStatus {
                    endpoint,
                    status: StatusCode::SERVICE_UNAVAILABLE,
                });
            }
            match reply {
                Reply::Ok => Ok(value),
                Reply::Status(status) => Err(FetchError::HttpStatus { endpoint, status }),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(value)
                }
            }
        }
    }

    #[async_trait]
    impl MeasurementSource for FakeSource {
        async fn fetch_weather(&self, coords: LatLon) -> Result<WeatherReading, FetchError> {
            let reading = WeatherReading {
                temperature: 30.1,
                humidity: 70.0,
                condition: "Clouds".to_string(),
                wind_speed: 3.4,
            };
            self.reply(self.weather, Endpoint::Weather, coords, reading)
                .await
        }

        async fn fetch_air_quality(
            &self,
            coords: LatLon,
        ) -> Result<AirQualityReading, FetchError> {
            let reading = AirQualityReading {
                aqi: 2,
                co: 201.9,
                no: 0.0,
                no2: 7.5,
                o3: 68.7,
                so2: 2.1,
                pm2_5: 9.6,
                pm10: 14.2,
            };
            self.reply(self.air_quality, Endpoint::AirPollution, coords, reading)
                .await
        }
    }

    fn config(locations: Vec<LocationConfig>) -> Config {
        let settings = Settings {
            locations,
            fetch_timeout_ms: 50,
            ..Settings::default()
        };
        Config::new("test-key", None, settings).unwrap()
    }

    fn danang() -> LocationConfig {
        LocationConfig::new("Danang", 16.0678, 108.2208)
    }

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 7, minute, second).unwrap()
    }

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory(CoordinatePolicy::KeepExisting).unwrap()
    }

    #[tokio::test]
    async fn test_two_passes_same_bucket_store_once() -> Result<(), StoreError> {
        let config = config(vec![danang()]);
        let mut ingestor = Ingestor::builder()
            .source(FakeSource::new(Reply::Ok, Reply::Ok))
            .sink(store())
            .config(&config)
            .build();
        let cancel = CancellationToken::new();

        let first = ingestor.run_pass_at(at(0, 3), &cancel).await;
        let second = ingestor.run_pass_at(at(0, 41), &cancel).await;

        assert_eq!(first.complete(), 1);
        assert_eq!(second.complete(), 1);
        let receipt = second.reports[0].outcome.receipt().unwrap();
        assert_eq!(receipt.weather, FactWrite::AlreadyRecorded);
        assert_eq!(receipt.air_quality, FactWrite::AlreadyRecorded);

        let store = ingestor.sink();
        assert_eq!(store.count_weather_facts()?, 1);
        assert_eq!(store.count_air_quality_facts()?, 1);
        assert_eq!(
            store.weather_facts_for("Danang")?[0].observed_at,
            "2024-01-01 07:00:00"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_air_quality_server_error_is_partial() -> Result<(), StoreError> {
        let config = config(vec![danang()]);
        let mut ingestor = Ingestor::builder()
            .source(FakeSource::new(
                Reply::Ok,
                Reply::Status(StatusCode::INTERNAL_SERVER_ERROR),
            ))
            .sink(store())
            .config(&config)
            .build();

        let summary = ingestor
            .run_pass_at(at(5, 0), &CancellationToken::new())
            .await;

        assert_eq!(summary.partial(), 1);
        let report = summary.report_for("danang").unwrap();
        assert_eq!(report.outcome.failed_stage(), Some(Stage::FetchAirQuality));
        match &report.outcome {
            CycleOutcome::Partial { receipt, failure } => {
                assert_eq!(receipt.weather, FactWrite::Inserted);
                assert_eq!(receipt.air_quality, FactWrite::Unavailable);
                assert!(matches!(
                    failure,
                    FetchError::HttpStatus { status, .. } if *status == StatusCode::INTERNAL_SERVER_ERROR
                ));
            }
            other => panic!("expected a partial cycle, got {:?}", other),
        }

        let store = ingestor.sink();
        assert_eq!(store.weather_facts_for("Danang")?.len(), 1);
        assert!(store.air_quality_facts_for("Danang")?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_location_does_not_stop_the_pass() -> Result<(), StoreError> {
        let config = config(vec![LocationConfig::new("Hanoi", HANOI.0, HANOI.1), danang()]);
        let mut source = FakeSource::new(Reply::Ok, Reply::Ok);
        source.broken = Some(HANOI);
        let mut ingestor = Ingestor::builder()
            .source(source)
            .sink(store())
            .config(&config)
            .build();

        let summary = ingestor
            .run_pass_at(at(10, 0), &CancellationToken::new())
            .await;

        assert_eq!(summary.reports.len(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.complete(), 1);
        assert!(matches!(
            summary.report_for("Hanoi").unwrap().outcome,
            CycleOutcome::FetchFailed { .. }
        ));

        let store = ingestor.sink();
        assert!(store.find_location("Hanoi")?.is_none());
        assert_eq!(store.weather_facts_for("Danang")?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out() {
        let config = config(vec![danang()]);
        let mut ingestor = Ingestor::builder()
            .source(FakeSource::new(Reply::Hang, Reply::Ok))
            .sink(store())
            .config(&config)
            .build();

        let summary = ingestor
            .run_pass_at(at(0, 0), &CancellationToken::new())
            .await;

        match &summary.reports[0].outcome {
            CycleOutcome::Partial { receipt, failure } => {
                assert!(matches!(
                    failure,
                    FetchError::TimedOut {
                        endpoint: Endpoint::Weather,
                        ..
                    }
                ));
                assert_eq!(receipt.weather, FactWrite::Unavailable);
                assert_eq!(receipt.air_quality, FactWrite::Inserted);
            }
            other => panic!("expected a partial cycle, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_pass_stores_nothing() -> Result<(), StoreError> {
        let config = config(vec![danang()]);
        let mut ingestor = Ingestor::builder()
            .source(FakeSource::new(Reply::Ok, Reply::Ok))
            .sink(store())
            .config(&config)
            .build();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = ingestor.run_pass_at(at(0, 0), &cancel).await;

        assert!(summary.cancelled);
        assert!(summary.reports.is_empty());
        assert_eq!(ingestor.sink().count_weather_facts()?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_fetches_keep_location_order() {
        let locations = vec![
            LocationConfig::new("Hanoi", HANOI.0, HANOI.1),
            danang(),
            LocationConfig::new("Hue", 16.4637, 107.5909),
        ];
        let mut settings = Settings {
            locations,
            fetch_concurrency: 3,
            ..Settings::default()
        };
        settings.granularity = crate::types::granularity::Granularity::Hour;
        let config = Config::new("test-key", None, settings).unwrap();
        let mut ingestor = Ingestor::builder()
            .source(FakeSource::new(Reply::Ok, Reply::Ok))
            .sink(store())
            .config(&config)
            .build();

        let summary = ingestor
            .run_pass_at(at(30, 0), &CancellationToken::new())
            .await;

        let names: Vec<&str> = summary.reports.iter().map(|r| r.location.as_str()).collect();
        assert_eq!(names, ["Hanoi", "Danang", "Hue"]);
        assert_eq!(summary.complete(), 3);
        assert_eq!(ingestor.source.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_csv_sink_pass() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let config = config(vec![danang()]);
        let mut ingestor = Ingestor::builder()
            .source(FakeSource::new(Reply::Ok, Reply::Ok))
            .sink(CsvFileSink::new(dir.path().join("weather_air_quality.csv")))
            .config(&config)
            .build();

        let summary = ingestor
            .run_pass_at(at(0, 0), &CancellationToken::new())
            .await;
        assert_eq!(summary.complete(), 1);

        let sink = ingestor.into_sink();
        let text = std::fs::read_to_string(sink.path())?;
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("2024-01-01 07:00:00,Danang,30.1,70,Clouds,3.4,2,"));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pass_on_multi_thread_runtime() -> Result<(), StoreError> {
        let config = config(vec![LocationConfig::new("Hanoi", HANOI.0, HANOI.1), danang()]);
        let mut ingestor = Ingestor::builder()
            .source(FakeSource::new(Reply::Ok, Reply::Ok))
            .sink(store())
            .config(&config)
            .build();

        let summary = ingestor
            .run_pass_at(at(20, 0), &CancellationToken::new())
            .await;

        assert_eq!(summary.complete(), 2);
        let store = ingestor.sink();
        assert_eq!(store.count_weather_facts()?, 2);
        assert_eq!(store.count_air_quality_facts()?, 2);
        Ok(())
    }
}
