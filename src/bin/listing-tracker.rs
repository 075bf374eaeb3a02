use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use listing_tracker::{
    ExportFormat, HistoryStore, RawRecord, ScrapeContext, StoreConfig, Timestamp,
};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "listing-tracker")]
#[command(about = "Per-model listing price history", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, env = "LISTING_CONFIG", default_value = "listing-tracker.json")]
    config: PathBuf,

    /// Data directory (overrides the configuration file)
    #[arg(long, env = "LISTING_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge one scrape run (a JSON array of raw records) into a model
    Merge {
        #[arg(short, long)]
        model: String,

        #[arg(short, long)]
        input: PathBuf,

        /// Scrape date for records without one (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Scrape timestamp in Unix seconds for records without one
        #[arg(long)]
        timestamp: Option<i64>,
    },
    /// Show every stored model
    Status,
    /// Summary statistics for a model
    Stats {
        #[arg(short, long)]
        model: String,

        /// Include the per-year breakdown
        #[arg(long)]
        years: bool,
    },
    /// Export a model's history rows
    Export {
        #[arg(short, long)]
        model: String,

        #[arg(short, long, default_value = "csv")]
        format: ExportFormat,

        #[arg(short, long)]
        output: PathBuf,
    },
}

/// `RUST_LOG` directives when present and valid, otherwise `info`.
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok()))
        .init();

    let cli = Cli::parse();

    let mut config = StoreConfig::from_file(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    let store = HistoryStore::open(config)?;

    match cli.command {
        Command::Merge {
            model,
            input,
            date,
            timestamp,
        } => {
            let file = File::open(&input)
                .with_context(|| format!("opening {}", input.display()))?;
            let records: Vec<RawRecord> = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing {}", input.display()))?;

            let context = match (date, timestamp) {
                (Some(date), Some(ts)) => ScrapeContext::new(date, Timestamp(ts)),
                (Some(date), None) => ScrapeContext::on(date),
                (None, Some(ts)) => {
                    let now = ScrapeContext::now();
                    ScrapeContext::new(now.date, Timestamp(ts))
                }
                (None, None) => ScrapeContext::now(),
            };

            let report = store.merge_batch(&model, &records, Some(&context))?;
            for rejection in &report.rejections {
                println!(
                    "  skipped record {} ({}): {}",
                    rejection.index,
                    rejection.id.as_deref().unwrap_or("no id"),
                    rejection.error
                );
            }
            println!("{report}");
        }
        Command::Status => {
            let statuses = store.data_status()?;
            if statuses.is_empty() {
                println!("No data in {}", store.data_dir().display());
            }
            for status in statuses {
                let updated = status
                    .last_updated
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{}: {} listings, {} price readings, last updated {}",
                    status.model, status.listing_count, status.reading_count, updated
                );
            }
        }
        Command::Stats { model, years } => {
            let stats = store.summary_stats(&model)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            if years {
                let breakdown = store.year_analysis(&model)?;
                println!("{}", serde_json::to_string_pretty(&breakdown)?);
            }
        }
        Command::Export {
            model,
            format,
            output,
        } => {
            let count = store.export(&model, format, &output)?;
            println!("Exported {count} rows to {}", output.display());
        }
    }

    Ok(())
}
