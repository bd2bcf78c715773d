//! Barrier station - two-lane vehicle access controller
//!
//! Runs the entry and exit lanes against a line-oriented TCP backend.
//!
//! Module structure:
//! - `domain/` - Core types (lanes, UIDs, protocol, debounce, lane cycles)
//! - `io/` - External interfaces (backend link, readers, sensors, outputs, journal)
//! - `services/` - Control logic (Lane, Dispatcher, Station)
//! - `infra/` - Infrastructure (Config, Metrics)

use barrier_station::infra::{Config, Metrics, ReaderMode};
use barrier_station::io::{LinkSettings, LogActuators, SerialReader, SimBench, TcpLink};
use barrier_station::services::Station;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Barrier station - two-lane vehicle access controller
#[derive(Parser, Debug)]
#[command(name = "barrier-station", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/station.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_logging(json: bool) {
    // RUST_LOG overrides the default INFO level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), git_hash = env!("GIT_HASH"), "barrier-station starting");

    let config = Config::load_from_path(&args.config);
    let reader_mode = match config.reader_mode() {
        ReaderMode::Sim => "sim",
        ReaderMode::Serial => "serial",
    };
    info!(
        config_file = %config.config_file(),
        station_id = %config.station_id(),
        backend_addr = %config.backend_addr(),
        retry_secs = %config.backend_retry_interval().as_secs(),
        server_timeout_ms = %config.server_timeout().as_millis(),
        debounce_ms = %config.debounce().as_millis(),
        clearance_delay_ms = %config.clearance_delay().as_millis(),
        tick_ms = %config.tick_interval().as_millis(),
        reader_mode = %reader_mode,
        journal_file = ?config.journal_file(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_shutdown = shutdown_rx.clone();
        let station_id = config.station_id().to_string();
        tokio::spawn(async move {
            if let Err(e) = barrier_station::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                station_id,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "prometheus_server_error");
            }
        });
    }

    // Start metrics reporter
    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                metrics_clone.report().log();
            }
        });
    }

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let link = TcpLink::new(LinkSettings::from_config(&config), metrics.clone());

    // Beam inputs have no hardware driver here; the console drives them in both modes
    let bench = SimBench::new();
    tokio::spawn(bench.clone().run_console(shutdown_rx.clone()));

    match config.reader_mode() {
        ReaderMode::Sim => {
            let station =
                Station::new(&config, link, bench.clone(), bench, LogActuators, metrics.clone());
            station.run(shutdown_rx).await;
        }
        ReaderMode::Serial => {
            let reader = SerialReader::spawn(&config, shutdown_rx.clone());
            let station = Station::new(&config, link, reader, bench, LogActuators, metrics.clone());
            station.run(shutdown_rx).await;
        }
    }

    metrics.report().log();
    info!("barrier-station shutdown complete");
    Ok(())
}
