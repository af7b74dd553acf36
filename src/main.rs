use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use olist_delivery_insights::config::{MapSettings, DATA_DIR_ENV, DEFAULT_SAMPLE_ROWS, LOG_ENV};
use olist_delivery_insights::store::DatasetCache;
use olist_delivery_insights::{delivery, report};

#[derive(Parser)]
#[command(name = "olist-insights")]
#[command(about = "Delivery and geography analysis of the Olist dataset", long_about = None)]
struct Cli {
    /// Directory holding the Olist CSV files
    #[arg(long, env = DATA_DIR_ENV)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct MapArgs {
    #[arg(long, default_value_t = MapSettings::default().sellers)]
    sellers: usize,
    #[arg(long, default_value_t = MapSettings::default().customers)]
    customers: usize,
    #[arg(long, default_value_t = MapSettings::default().seed)]
    seed: u64,
}

impl MapArgs {
    fn settings(&self) -> MapSettings {
        MapSettings {
            sellers: self.sellers,
            customers: self.customers,
            seed: self.seed,
            ..MapSettings::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize loaded files and order statuses
    Overview,
    /// Analyze real versus estimated delivery times
    Delivery {
        #[arg(long, default_value_t = DEFAULT_SAMPLE_ROWS)]
        sample_rows: usize,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export sampled seller and customer locations as JSON
    Map {
        #[command(flatten)]
        map: MapArgs,
        #[arg(long, default_value = "map.json")]
        out: PathBuf,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        map: MapArgs,
        #[arg(long, default_value_t = DEFAULT_SAMPLE_ROWS)]
        sample_rows: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut cache = DatasetCache::new(&cli.data_dir);
    let store = cache
        .get_or_load()
        .context("failed to load the Olist dataset")?;

    match cli.command {
        Commands::Overview => {
            let mut output = String::new();
            report::render_overview(&mut output, &report::dataset_overview(store));
            output.push('\n');
            let statuses = store
                .order_statuses()
                .map(|statuses| report::summarize_by_status(&statuses));
            report::render_statuses(&mut output, &statuses);
            print!("{output}");
        }
        Commands::Delivery { sample_rows, json } => {
            let metrics = store
                .orders()
                .and_then(|orders| delivery::compute_metrics(&orders, sample_rows));

            match (&metrics, json) {
                (Ok(result), true) => {
                    println!("{}", serde_json::to_string_pretty(result)?);
                }
                (Err(error), true) => {
                    anyhow::bail!("delivery analysis unavailable: {error}");
                }
                (_, false) => {
                    let mut output = String::new();
                    report::render_delivery(&mut output, &metrics);
                    print!("{output}");
                }
            }
        }
        Commands::Map { map, out } => {
            let comparative = report::comparative_map(store, &map.settings())
                .context("comparative map unavailable")?;
            let json = serde_json::to_string_pretty(&comparative)?;
            std::fs::write(&out, json)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "Wrote {} sellers and {} customers to {}.",
                comparative.sellers.len(),
                comparative.customers.len(),
                out.display()
            );
        }
        Commands::Report {
            map,
            sample_rows,
            out,
        } => {
            let markdown = report::build_report(store, &map.settings(), sample_rows);
            std::fs::write(&out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
