//! Catchment time-series extractor.
//!
//! Scans raw product directories, extracts every complete scene that a
//! variable has not recorded yet and appends per-catchment rows to its stores.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::task;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use extraction::{product_status, ExtractionError, ExtractorConfig, Maintainer, Orchestrator};

#[derive(Parser, Debug)]
#[command(name = "extractor")]
#[command(about = "Per-catchment time-series extraction from raster products")]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "EXTRACTOR_CONFIG",
        default_value = "config/extractor.yaml",
        global = true
    )]
    config: PathBuf,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract complete scenes missing from the stores
    Extract {
        /// Product to process (default: all configured)
        #[arg(short, long)]
        product: Option<String>,

        /// Maximum scenes per product and pass
        #[arg(short, long)]
        limit: Option<usize>,

        /// Run once and exit (vs continuous polling)
        #[arg(long)]
        once: bool,

        /// Seconds between polling passes
        #[arg(long, default_value_t = 3600)]
        interval_secs: u64,
    },

    /// Delete raw files of pending scenes that cannot be decoded
    Maintain {
        #[arg(short, long)]
        product: Option<String>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print inventory and store state as JSON
    Status {
        #[arg(short, long)]
        product: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level, args.json)?;

    let config = ExtractorConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    info!(
        config = %args.config.display(),
        products = config.products.len(),
        "Loaded configuration"
    );

    match args.command {
        Command::Extract {
            product,
            limit,
            once,
            interval_secs,
        } => {
            let orchestrator = Arc::new(Orchestrator::new(config)?.with_limit(limit));
            if once {
                extract_pass(orchestrator, product).await
            } else {
                poll(orchestrator, product, interval_secs).await
            }
        }
        Command::Maintain { product, limit } => maintain(config, product, limit).await,
        Command::Status { product } => status(&config, product.as_deref()),
    }
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Extraction passes until a configuration error or the process is stopped.
async fn poll(orchestrator: Arc<Orchestrator>, product: Option<String>, interval_secs: u64) -> Result<()> {
    info!(interval_secs, "Starting continuous polling");
    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = extract_pass(Arc::clone(&orchestrator), product.clone()).await {
            if e.downcast_ref::<ExtractionError>().is_some_and(ExtractionError::is_fatal) {
                return Err(e);
            }
            error!(error = %e, "Extraction pass failed");
        }
    }
}

async fn extract_pass(orchestrator: Arc<Orchestrator>, product: Option<String>) -> Result<()> {
    let reports = task::spawn_blocking(move || orchestrator.run(product.as_deref()))
        .await
        .context("Extraction task panicked")??;

    for report in &reports {
        info!(
            product = %report.product,
            complete = report.classification.complete.len(),
            work_set = report.work_set.len(),
            rows = report.rows_written(),
            failed = report.failed.len(),
            blocked = report.blocked.len(),
            "Extraction pass complete"
        );
    }
    Ok(())
}

async fn maintain(config: ExtractorConfig, product: Option<String>, limit: Option<usize>) -> Result<()> {
    let reports = task::spawn_blocking(move || {
        Maintainer::new(config)
            .with_limit(limit)
            .run(product.as_deref())
    })
    .await
    .context("Maintenance task panicked")??;

    for report in &reports {
        if !report.deleted.is_empty() {
            warn!(product = %report.product, deleted = report.deleted.len(), "Removed unreadable raw files");
        }
        info!(
            product = %report.product,
            scenes = report.scenes,
            checked = report.checked,
            "Maintenance pass complete"
        );
    }
    Ok(())
}

fn status(config: &ExtractorConfig, product: Option<&str>) -> Result<()> {
    let statuses = config
        .select(product)?
        .into_iter()
        .map(product_status)
        .collect::<Result<Vec<_>, _>>()?;
    println!("{}", serde_json::to_string_pretty(&statuses)?);
    Ok(())
}
