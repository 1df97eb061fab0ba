//! Prometheus exporter for site and circuit health.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use sitewatch_exporter::config::LogFormat;
use sitewatch_exporter::{ApiPoller, ExporterConfig, HttpServer, MetricCollector};

/// Prometheus exporter for site and circuit health.
#[derive(Parser, Debug)]
#[command(name = "sitewatch-exporter")]
#[command(about = "Export vendor site/circuit health as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: String,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration; a missing or invalid file is fatal.
    let mut config = ExporterConfig::load_from_file(&args.config)?;

    // Override listen address from CLI
    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
    }

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("sitewatch_exporter={}", log_level).parse()?);

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    info!("Starting sitewatch exporter");

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Shared metric store, written by the poller, read by scrape handlers
    let collector = Arc::new(MetricCollector::new());

    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let poller = ApiPoller::new(config.api.clone(), collector.clone())
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
    let http_server = HttpServer::new(
        collector.clone(),
        listen_addr,
        config.prometheus.path.clone(),
    );

    // Start poller
    let poller_shutdown = shutdown_rx.clone();
    let poller_task = tokio::spawn(async move {
        poller.run(poller_shutdown).await;
    });

    // Start HTTP server
    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate()
                ).unwrap();
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for tasks to complete
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = poller_task.await;
        let _ = http_task.await;
    })
    .await;

    // Print final stats
    let stats = collector.stats();
    info!(
        polls_total = stats.polls_total,
        polls_succeeded = stats.polls_succeeded,
        polls_failed = stats.polls_failed,
        series_count = collector.series_count(),
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}
