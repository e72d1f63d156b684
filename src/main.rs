//! Farmsense Agent CLI
//!
//! Sensor telemetry extraction and analytics for hydroponic farms.

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser as ClapParser, Subcommand};
use farmsense_agent::{
    analytics::{AnomalyDetector, Aggregator, HealthScorer, DEFAULT_PERCENTILES, DEFAULT_THRESHOLD},
    config::Config,
    ingest::{Backoff, IngestPipeline, StdinFeed},
    store::{MemoryStore, SensorStore},
    telemetry::{partition_key, Parser, SensorType},
    StatError, VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(ClapParser)]
#[command(name = "farmsense")]
#[command(author = "Farmsense")]
#[command(version = VERSION)]
#[command(about = "Sensor telemetry extraction and analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a telemetry log file into the store and report counts
    Extract {
        /// Log file to replay
        file: PathBuf,

        /// Records per store insert
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Replay a log file and print per-partition statistics
    Report {
        /// Log file to replay
        file: PathBuf,

        /// Restrict to one sensor type (e.g. co2, pH)
        #[arg(long)]
        sensor: Option<String>,

        /// Restrict to one date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Replay a log file and flag out-of-band readings
    Anomalies {
        /// Log file to replay
        file: PathBuf,

        /// Sensor type (e.g. co2)
        #[arg(long)]
        sensor: String,

        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Measurement key (e.g. co2)
        #[arg(long)]
        measurement: String,

        /// Band half-width in standard deviations
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,
    },

    /// Replay a log file and print the composite health score
    Score {
        /// Log file to replay
        file: PathBuf,

        /// Score as of this moment (YYYY-MM-DD HH:MM:SS) instead of latest
        #[arg(long)]
        at: Option<String>,
    },

    /// Ingest a live feed from standard input until Ctrl+C
    Watch {
        /// Records per store insert
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Show configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract { file, batch_size } => cmd_extract(&file, batch_size),
        Commands::Report { file, sensor, date } => cmd_report(&file, sensor, date),
        Commands::Anomalies {
            file,
            sensor,
            date,
            measurement,
            threshold,
        } => cmd_anomalies(&file, &sensor, &date, &measurement, threshold),
        Commands::Score { file, at } => cmd_score(&file, at),
        Commands::Watch { batch_size } => cmd_watch(batch_size),
        Commands::Config => cmd_config(),
    }
}

/// Replay `file` into a fresh in-memory store.
fn replay(file: &std::path::Path, batch_size: Option<usize>) -> anyhow::Result<Arc<MemoryStore>> {
    let config = Config::load().unwrap_or_default();
    let store = Arc::new(MemoryStore::new());
    let parser = Parser::new()?;
    let pipeline = IngestPipeline::new(
        parser,
        store.clone(),
        batch_size.unwrap_or(config.batch_size),
    );

    let report = pipeline
        .replay_file(file)
        .with_context(|| format!("replaying {}", file.display()))?;
    println!("{}", report.summary());
    println!();
    Ok(store)
}

fn cmd_extract(file: &std::path::Path, batch_size: Option<usize>) -> anyhow::Result<()> {
    println!("Farmsense Agent v{VERSION}");
    println!();

    let store = replay(file, batch_size)?;
    let aggregator = Aggregator::new(store);

    println!("Partitions:");
    for sensor_type in SensorType::ALL {
        if let Some(latest) = aggregator.latest_collection(sensor_type)? {
            println!("  {sensor_type}: latest partition {latest}");
        }
    }
    Ok(())
}

fn cmd_report(
    file: &std::path::Path,
    sensor: Option<String>,
    date: Option<String>,
) -> anyhow::Result<()> {
    let only_sensor = sensor.as_deref().map(parse_sensor).transpose()?;
    let only_date = date.as_deref().map(parse_date).transpose()?;

    let store = replay(file, None)?;
    let aggregator = Aggregator::new(store.clone());

    for sensor_type in SensorType::ALL {
        if only_sensor.is_some_and(|s| s != sensor_type) {
            continue;
        }
        for partition in store.list_partitions(sensor_type.key())? {
            if let Some(date) = only_date {
                if partition != partition_key(sensor_type, date) {
                    continue;
                }
            }

            println!("Partition: {partition}");
            println!("  readings: {}", aggregator.count(&partition)?);
            println!("  rate: {}", fmt_stat(aggregator.rate(&partition)));

            for measurement in sensor_type.measurement_keys() {
                println!("  {measurement}:");
                println!(
                    "    average: {}",
                    fmt_stat(aggregator.average(&partition, measurement))
                );
                println!(
                    "    highest: {}",
                    fmt_stat(aggregator.highest(&partition, measurement))
                );
                println!(
                    "    lowest: {}",
                    fmt_stat(aggregator.lowest(&partition, measurement))
                );
                println!(
                    "    median: {}",
                    fmt_stat(aggregator.median(&partition, measurement))
                );
                println!(
                    "    mode: {}",
                    fmt_stat(aggregator.mode(&partition, measurement))
                );
                println!(
                    "    stdev: {}",
                    fmt_stat(aggregator.standard_deviation(&partition, measurement))
                );
                match aggregator.percentiles(&partition, measurement, &DEFAULT_PERCENTILES) {
                    Ok(percentiles) => {
                        let rendered: Vec<String> = percentiles
                            .iter()
                            .map(|(p, v)| format!("p{p}={v:.2}"))
                            .collect();
                        println!("    percentiles: {}", rendered.join(", "));
                    }
                    Err(StatError::InsufficientData { .. }) => {
                        println!("    percentiles: insufficient data");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            println!();
        }
    }
    Ok(())
}

fn cmd_anomalies(
    file: &std::path::Path,
    sensor: &str,
    date: &str,
    measurement: &str,
    threshold: f64,
) -> anyhow::Result<()> {
    let sensor_type = parse_sensor(sensor)?;
    let date = parse_date(date)?;

    let store = replay(file, None)?;
    let detector = AnomalyDetector::new(store);

    match detector.detect(sensor_type, date, measurement, threshold) {
        Ok(anomalies) if anomalies.is_empty() => {
            println!("No anomalies in {measurement} for {sensor_type} on {date}.");
        }
        Ok(anomalies) => {
            println!(
                "{} anomalous reading(s) in {measurement} for {sensor_type} on {date}:",
                anomalies.len()
            );
            for reading in anomalies {
                println!(
                    "  [{}] {measurement} = {}",
                    reading.timestamp.format("%H:%M:%S"),
                    reading.data[measurement]
                );
            }
        }
        Err(StatError::InsufficientData { partition, .. }) => {
            println!("Not enough data in {partition} to establish a band.");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn cmd_score(file: &std::path::Path, at: Option<String>) -> anyhow::Result<()> {
    let as_of = at
        .as_deref()
        .map(|s| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .with_context(|| format!("invalid --at value: {s}"))
        })
        .transpose()?;

    let config = Config::load().unwrap_or_default();
    let store = replay(file, None)?;
    let scorer = HealthScorer::new(store, config.ideal_bands);

    let report = scorer.score(as_of)?;
    println!(
        "Health score: {} ({} measurement(s) evaluated)",
        report.score, report.evaluated
    );
    if !report.skipped.is_empty() {
        println!("Skipped:");
        for note in &report.skipped {
            println!("  - {note}");
        }
    }
    Ok(())
}

fn cmd_watch(batch_size: Option<usize>) -> anyhow::Result<()> {
    println!("Farmsense Agent v{VERSION}");
    println!("Reading telemetry from stdin. Press Ctrl+C to stop.");
    println!();

    let config = Config::load().unwrap_or_default();
    let store = Arc::new(MemoryStore::new());
    let parser = Parser::new()?;
    let pipeline = IngestPipeline::new(
        parser,
        store.clone(),
        batch_size.unwrap_or(config.batch_size),
    );

    // Ctrl+C raises the shutdown flag; the pipeline flushes and returns.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    })
    .context("setting Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime")?;

    let backoff = Backoff::from_config(&config.feed);
    let report = runtime.block_on(pipeline.run(StdinFeed::new(), shutdown_rx, backoff))?;

    println!();
    println!("{}", report.summary());

    let scorer = HealthScorer::new(store, config.ideal_bands);
    let health = scorer.score(None)?;
    println!();
    println!(
        "Health score: {} ({} measurement(s) evaluated)",
        health.score, health.evaluated
    );
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Render a statistic, spelling out the insufficient-data case.
fn fmt_stat(result: Result<f64, StatError>) -> String {
    match result {
        Ok(value) => format!("{value:.2}"),
        Err(StatError::InsufficientData { .. }) => "insufficient data".to_string(),
        Err(e) => format!("error: {e}"),
    }
}

fn parse_sensor(s: &str) -> anyhow::Result<SensorType> {
    SensorType::from_key(s).with_context(|| {
        let known: Vec<&str> = SensorType::ALL.iter().map(|t| t.key()).collect();
        format!("unknown sensor type {s:?}; expected one of {known:?}")
    })
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date: {s}"))
}
