//! CLI entry point for the station tracker.
//!
//! Provides subcommands for running the poller and stats API, computing a
//! single day's stats, and building schedule artifacts from static GTFS data.

use anyhow::Result;
use clap::{Parser, Subcommand};
use station_tracker::{
    clock::{Clock, SystemClock},
    config::Config,
    fetch::BasicClient,
    gtfs,
    poller::Poller,
    reconcile::Reconciler,
    schedule::ScheduleLoader,
    server,
    stats::Aggregator,
    store::Store,
    uptime::UptimeTracker,
};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "station_tracker")]
#[command(about = "Tracks arrivals at one transit station and rates on-time performance", long_about = None)]
struct Cli {
    /// Optional JSON config file; defaults describe the CTA Blue Line stop
    /// at California
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the prediction poller and the stats API server
    Serve,
    /// Compute stats for one date and print the JSON
    Stats {
        /// Date key, YYYYMMDD
        #[arg(value_name = "DATE")]
        date: String,
    },
    /// Build per-stop schedule artifacts from static GTFS files
    BuildSchedules {
        /// Directory containing trips.txt, calendar.txt and stop_times.txt
        #[arg(short, long, default_value = "gtfs")]
        gtfs_dir: String,

        /// Route id to extract departures for
        #[arg(short, long, default_value = "Blue")]
        route: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/station_tracker.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("station_tracker.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => serve(config).await?,
        Commands::Stats { date } => {
            let store = Arc::new(Store::open(&config.db_path)?);
            let aggregator = build_aggregator(&config, store, Arc::new(SystemClock));
            println!("{}", aggregator.stats_for_date(&date).await?);
        }
        Commands::BuildSchedules { gtfs_dir, route } => {
            let written = gtfs::build_schedules(
                Path::new(&gtfs_dir),
                Path::new(&config.schedules_dir),
                &route,
                &config.stop_ids(),
            )?;
            info!(written, route = %route, "Schedule artifacts built");
        }
    }

    Ok(())
}

fn build_aggregator(config: &Config, store: Arc<Store>, clock: Arc<dyn Clock>) -> Aggregator {
    Aggregator::new(
        store.clone(),
        ScheduleLoader::new(&config.schedules_dir),
        UptimeTracker::new(store, config.poll_interval_ms),
        clock,
        config,
    )
}

async fn serve(config: Config) -> Result<()> {
    let store = Arc::new(Store::open(&config.db_path)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let client = BasicClient::with_timeout(std::time::Duration::from_secs(
        config.fetch_timeout_secs,
    ))?;
    let poller = Poller::new(
        config.clone(),
        client,
        Reconciler::new(store.clone(), config.tolerance()),
        UptimeTracker::new(store.clone(), config.poll_interval_ms),
        clock.clone(),
    );

    let aggregator = Arc::new(build_aggregator(&config, store, clock));

    info!(
        interval_ms = config.poll_interval_ms,
        station = config.target_station_code,
        "Starting prediction poller"
    );
    tokio::spawn(poller.run());

    server::run(config, aggregator).await?;
    Ok(())
}
