use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sluice::batch::{BatchDriver, HttpFetcher, WorkItem};
use sluice::config::SluiceConfig;
use sluice::ratelimit::LeakyBucket;

/// Fetch a list of URLs through a leaky bucket rate limiter.
#[derive(Debug, Parser)]
#[command(name = "sluice", version, about)]
struct Cli {
    /// File with one URL per line, optionally prefixed by an id
    input: PathBuf,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Units admitted per time period
    #[arg(long)]
    max_rate: Option<f64>,

    /// Length of the time period in seconds
    #[arg(long)]
    time_period: Option<f64>,

    /// Maximum number of requests in flight
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut SluiceConfig) {
        if let Some(max_rate) = self.max_rate {
            config.limiter.max_rate = max_rate;
        }
        if let Some(time_period) = self.time_period {
            config.limiter.time_period_secs = time_period;
        }
        if let Some(max_in_flight) = self.max_in_flight {
            config.batch.max_in_flight = max_in_flight;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = SluiceConfig::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    info!(
        max_rate = config.limiter.max_rate,
        time_period_secs = config.limiter.time_period_secs,
        max_in_flight = config.batch.max_in_flight,
        "Configuration loaded"
    );

    let input = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let items = WorkItem::parse_list(&input);
    if items.is_empty() {
        warn!(input = %cli.input.display(), "No work items found");
        return Ok(());
    }

    let limiter = Arc::new(LeakyBucket::from_config(&config.limiter)?);
    let fetcher = Arc::new(HttpFetcher::new(&config.batch)?);
    let driver = BatchDriver::new(limiter, fetcher, config.batch.clone());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let report = driver.run(items, cancel).await?;

    let mut stdout = std::io::stdout().lock();
    for response in report.responses.iter() {
        serde_json::to_writer(&mut stdout, response)?;
        writeln!(stdout)?;
    }
    stdout.flush()?;

    for item in &report.abandoned {
        warn!(item = %item, "Not fetched");
    }
    if report.cancelled {
        anyhow::bail!("batch job {} was cancelled", report.job_id);
    }
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling batch job");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling batch job");
        }
    }
}
