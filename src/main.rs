use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use pihub_harness::config::{Config, CONFIG_FILE};
use pihub_harness::telemetry::{export_csv, report_loop};
use pihub_harness::{LoadCoordinator, TelemetryReader, TimeSeries};

#[derive(Debug, Parser)]
#[command(about = "Telemetry reader and load generator for a PiHub server")]
struct Cli {
    /// TOML configuration file; `PIHUB__*` environment variables override it.
    #[arg(long, default_value = CONFIG_FILE)]
    config: String,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Poll one sensor reading and report the collected series until Ctrl-C.
    Telemetry,
    /// Flood the server from many concurrent clients.
    Load,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::new(&cli.config).context("Error loading config")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    init_logging(&config.log_level);

    match cli.mode {
        Mode::Telemetry => telemetry(config).await,
        Mode::Load => {
            LoadCoordinator::new(config).run().await;
            Ok(())
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn telemetry(config: Config) -> anyhow::Result<()> {
    let series = TimeSeries::with_retention(config.telemetry.max_samples);
    let shutdown = CancellationToken::new();

    let ctrl_c = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::debug!("Ctrl-C received, stopping telemetry");
                    shutdown.cancel();
                }
                // Without the signal there is nobody to wait for once the reader is gone.
                Err(err) => tracing::warn!("Unable to listen for Ctrl-C: {}", err),
            }
        })
    };

    let reporter = tokio::spawn(report_loop(
        series.clone(),
        config.telemetry.report_period(),
        shutdown.clone(),
    ));

    let reader = TelemetryReader::new(&config);
    let result = {
        let series = series.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { reader.run_supervised(&series, &shutdown).await })
            .await
            .context("Telemetry task panicked")?
    };

    // A failed reader only means the series stops growing; the consumer keeps reporting what
    // was collected until Ctrl-C.
    if let Err(err) = &result {
        tracing::error!("Telemetry stopped: {}. Press Ctrl-C to exit", err);
        let _ = ctrl_c.await;
        shutdown.cancel();
    }
    reporter.await?;

    if let Some(path) = &config.telemetry.export_csv {
        export_csv(path, &series.snapshot()).await?;
    }
    tracing::info!("Telemetry stopped, {} samples collected", series.len());
    Ok(())
}
