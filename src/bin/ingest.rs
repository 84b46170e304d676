use argh::FromArgs;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use weather_ingest::{
    error_chain, Config, CsvFileSink, IngestError, Ingestor, ObservationSink, OpenWeatherClient,
    PassSummary, SqliteStore,
};

#[derive(FromArgs)]
/// Fetch current weather and air quality for every configured location and store them once.
struct Args {
    /// path to a YAML settings file (default: $WEATHER_INGEST_CONFIG, then the user config dir)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// append to this CSV file instead of the SQLite store from $WEATHER_DB_URL
    #[argh(option)]
    csv_sink: Option<PathBuf>,
}

/// Exit status for failures that happen before any location is processed.
const EXIT_FATAL: u8 = 2;

async fn run_pass<K: ObservationSink>(
    client: OpenWeatherClient,
    sink: K,
    config: &Config,
    cancel: &CancellationToken,
) -> PassSummary {
    let mut ingestor = Ingestor::builder()
        .source(client)
        .sink(sink)
        .config(config)
        .build();
    ingestor.run_pass(cancel).await
}

async fn run(args: Args, cancel: CancellationToken) -> Result<PassSummary, IngestError> {
    let config = Config::from_env(args.config.as_deref())?;
    log::debug!("{:?}", config);

    let client = OpenWeatherClient::builder()
        .api_key(config.api_key())
        .maybe_base_url(config.settings.base_url.clone())
        .build()?;

    let summary = match &args.csv_sink {
        Some(path) => {
            log::info!("Appending observations to {}", path.display());
            run_pass(client, CsvFileSink::new(path), &config, &cancel).await
        }
        None => {
            let store = SqliteStore::open(
                config.database_url()?,
                config.settings.coordinate_policy,
                config.store_busy_timeout(),
            )?;
            run_pass(client, store, &config, &cancel).await
        }
    };
    Ok(summary)
}

#[tokio::main]
async fn main() -> ExitCode {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Received Ctrl+C, stopping after the current location...");
                cancel.cancel();
            }
        });
    }

    match run(args, cancel).await {
        Ok(summary) => {
            for report in &summary.reports {
                match report.outcome.failed_stage() {
                    None => log::info!("{}: ok", report.location),
                    Some(stage) => log::warn!("{}: failed at {}", report.location, stage),
                }
            }
            log::info!(
                "Done: {} complete, {} partial, {} failed{}",
                summary.complete(),
                summary.partial(),
                summary.failed(),
                if summary.cancelled { " (cancelled)" } else { "" }
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", error_chain(&e));
            ExitCode::from(EXIT_FATAL)
        }
    }
}
