//! Penny Daemon
//!
//! Thermostat service: reads sensors on a fixed interval, switches Kasa
//! outlets to keep each reading inside its target band, and serves the
//! latest readings as Prometheus metrics.

mod config;
mod control;
mod devices;
mod metrics;
mod sensors;
mod web;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::{Config, SensorInfo};
use devices::{DeviceOptions, Registry};
use metrics::SensorMetrics;
use sensors::Sensor;

#[derive(Parser)]
#[command(name = "pennyd")]
#[command(about = "Thermostat daemon for Kasa power strips and 1-Wire probes")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(default_value = "config/penny.toml")]
    config: PathBuf,

    /// Validate the configuration and device bindings, then exit
    #[arg(long)]
    check: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    info!("Penny starting, config: {}", args.config.display());

    let config = Config::load(&args.config).context("Failed to load configuration")?;
    let interval = config.interval()?;
    let options = DeviceOptions {
        timeout: config.device_timeout()?,
    };

    // Connect devices and bind sensors before anything runs
    let registry = Registry::build(&config.devices, &options)
        .await
        .context("Failed to initialize devices")?;
    if registry.is_empty() {
        info!("No devices configured, sensors will only report metrics");
    }
    let sensors = init_sensors(&registry, &config.sensors)?;

    if args.check {
        info!(
            "Configuration OK: {} devices, {} sensors",
            registry.len(),
            sensors.len()
        );
        return Ok(());
    }

    let metrics = Arc::new(SensorMetrics::new().context("Failed to register metrics")?);

    // Start metrics server
    let address = config.metrics_listen_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind metrics address {}", address))?;
    info!("Serving prometheus metrics on http://{}/metrics", address);

    let web_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = web::serve(listener, web_metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Setup Unix signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
    };

    info!("Penny running, updating every {:?}", interval);
    control::run(&sensors, interval, metrics.as_ref(), shutdown).await;

    Ok(())
}

/// Builds every configured sensor and binds it to its outlet.
fn init_sensors<'r>(registry: &'r Registry, infos: &[SensorInfo]) -> Result<Vec<Sensor<'r>>> {
    infos
        .iter()
        .map(|info| {
            let mut sensor = Sensor::new(info.clone())
                .with_context(|| format!("Failed to create sensor {}", info.name))?;
            registry
                .bind(&mut sensor)
                .with_context(|| format!("Failed to bind sensor {}", info.name))?;

            info!(
                "Sensor {} configured. Range: {} - {}.{}",
                info.name,
                sensor.low(),
                sensor.high(),
                if sensor.is_bound() { "" } else { " (metrics only)" }
            );
            Ok(sensor)
        })
        .collect()
}
