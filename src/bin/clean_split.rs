use argh::FromArgs;
use chrono::Local;
use std::path::PathBuf;
use std::process::ExitCode;
use weather_ingest::{error_chain, run_clean_split};

#[derive(FromArgs)]
/// Deduplicate a raw observation CSV and split it into weather and air-quality files.
struct Args {
    /// raw file written by the CSV sink
    #[argh(option, short = 'i', default = "PathBuf::from(\"weather_air_quality.csv\")")]
    input: PathBuf,

    /// directory for the cleaned files
    #[argh(option, short = 'o', default = "PathBuf::from(\".\")")]
    output_dir: PathBuf,
}

fn main() -> ExitCode {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    match run_clean_split(&args.input, &args.output_dir, Local::now().naive_local()) {
        Ok(report) => {
            println!("Created {}", report.weather_path.display());
            println!("Created {}", report.air_quality_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", error_chain(&e));
            ExitCode::FAILURE
        }
    }
}
