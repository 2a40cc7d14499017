use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueHint};
use log::debug;

use activity_maps::sync::DEFAULT_MAX_RATE_LIMIT_PAUSES;
use activity_maps::{
    derive_all, Config, CsvStore, DatasetStore, MapRenderer, Result, StravaClient, SyncError,
    SyncOptions, SyncReport, SyncStatus, Synchronizer, TokenProvider, RATE_LIMIT_PAUSE,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Sync Strava activities and render yearly path maps", long_about = None)]
struct Cli {
    /// JSON config file with a `credentials` object
    #[arg(short, long, env = "ACTIVITY_MAPS_CONFIG", default_value = "config.json", value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// Directory holding `<client_id>-activities.csv`
    #[arg(long, default_value = ".", value_hint = ValueHint::DirPath)]
    data_dir: PathBuf,

    /// Directory for walks.html and rides.html
    #[arg(long, default_value = ".", value_hint = ValueHint::DirPath)]
    output_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch new activities and missing paths into the dataset
    Sync(SyncArgs),
    /// Render maps from the stored dataset
    Render,
    /// Sync, then render (default)
    Run(SyncArgs),
}

#[derive(Args, Debug, Clone)]
struct SyncArgs {
    /// Stop at the first rate limit instead of waiting it out
    #[arg(long)]
    no_wait: bool,

    /// Rate-limit pauses allowed before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_RATE_LIMIT_PAUSES)]
    max_pauses: u32,
}

impl SyncArgs {
    fn options(&self) -> SyncOptions {
        SyncOptions {
            rate_limit_pause: RATE_LIMIT_PAUSE,
            max_rate_limit_pauses: if self.no_wait { 0 } else { self.max_pauses },
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let store = CsvStore::for_client(&cli.data_dir, &config.credentials.client_id);
    debug!("Dataset file: {}", store.path().display());

    let command = cli.command.unwrap_or(Command::Run(SyncArgs {
        no_wait: false,
        max_pauses: DEFAULT_MAX_RATE_LIMIT_PAUSES,
    }));

    match command {
        Command::Sync(args) => sync(&config, &store, &args).await.map(|_| ()),
        Command::Render => render(&config, &store, &cli.output_dir),
        Command::Run(args) => {
            let report = sync(&config, &store, &args).await?;
            if report.status == SyncStatus::Cancelled {
                return Ok(());
            }
            render(&config, &store, &cli.output_dir)
        }
    }
}

async fn sync(config: &Config, store: &CsvStore, args: &SyncArgs) -> Result<SyncReport> {
    let token = TokenProvider::new()?.refresh(&config.credentials).await?;
    let client = StravaClient::new(&token.access_token)?;
    let synchronizer = Synchronizer::new(&client, store, args.options());

    let report = synchronizer.run_until(shutdown_signal()).await?;
    print_report(&report);
    Ok(report)
}

fn render(config: &Config, store: &CsvStore, output_dir: &Path) -> Result<()> {
    let dataset = store.load()?.ok_or_else(|| {
        SyncError::config(format!(
            "no dataset at {}; run `activity-maps sync` first",
            store.path().display()
        ))
    })?;
    let derived = derive_all(&dataset);
    let written = MapRenderer::new(config.map.clone()).write_maps(&derived, output_dir)?;
    for path in written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        debug!("Ctrl-C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_report(report: &SyncReport) {
    if report.listing_rate_limited {
        println!("Rate limit hit while listing activities; newer activities will be picked up next run.");
    }
    match report.status {
        SyncStatus::Complete => println!(
            "Adding {} new activity details ({} activities total).",
            report.details_resolved, report.total_activities
        ),
        SyncStatus::NoNewData => println!("No new data found."),
        SyncStatus::RateLimited => println!(
            "Rate limit exceeded after {} pauses; {} details saved this run. Try again in {} minutes.",
            report.rate_limit_pauses,
            report.details_resolved,
            minutes(RATE_LIMIT_PAUSE)
        ),
        SyncStatus::Cancelled => println!(
            "Cancelled; {} details saved this run.",
            report.details_resolved
        ),
    }
}

fn minutes(duration: Duration) -> u64 {
    duration.as_secs().div_ceil(60)
}
