//! parkgate - unattended parking barrier access control
//!
//! A barcode/QR scanner on a serial line emits fiscal-receipt payloads.
//! Each payload is validated (single-use, recent, correctly typed, issued
//! by a known fiscal device, optionally confirmed online) and, when
//! accepted, the barrier relay is pulsed over Modbus TCP. A counter loop
//! derives lot occupancy from in/out totalizer registers; a watchdog
//! restarts dead workers. Runs until an external shutdown signal.

use clap::Parser;
use parkgate::infra::{Config, Ledger};
use parkgate::io::{ModbusTransport, OnlineVerifier};
use parkgate::services::{
    CounterTracker, GateActuator, IngestLoop, ValidationPolicy, Validator, Watchdog,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// parkgate - parking barrier access-control daemon
#[derive(Parser, Debug)]
#[command(name = "parkgate", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Structured logging, level via RUST_LOG (default INFO)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), git = env!("GIT_HASH"), "parkgate starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);
    info!(
        config_file = %config.config_file(),
        serial_device = %config.serial_device(),
        serial_baud = config.serial_baud(),
        modbus_addr = %config.modbus_addr(),
        gate_coil = config.gate_coil(),
        gate_dwell_ms = config.gate_dwell().as_millis() as u64,
        online = config.online_enabled(),
        allow_duplicates = config.allow_duplicates(),
        window_secs = config.window_secs(),
        fiscal_drives = ?config.fiscal_drives(),
        store = %config.store_path(),
        "config_loaded"
    );

    let ledger = Arc::new(Ledger::open(config.store_path())?);
    let transport = Arc::new(ModbusTransport::new(
        config.modbus_addr().to_string(),
        config.modbus_op_timeout(),
    ));
    let gate = Arc::new(GateActuator::new(transport.clone(), &config));

    let online = if config.online_enabled() {
        Some(OnlineVerifier::new(
            config.online_url(),
            config.online_found(),
            config.online_timeout(),
        )?)
    } else {
        None
    };
    let validator =
        Arc::new(Validator::new(ValidationPolicy::from_config(&config), ledger.clone(), online));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watchdog = Arc::new(Watchdog::new(config.watchdog_interval()));

    // Ingestion loop: scan -> decode -> validate -> ledger -> gate
    {
        let config = config.clone();
        let validator = validator.clone();
        let gate = gate.clone();
        let shutdown = shutdown_rx.clone();
        watchdog.supervise("ingest", move || {
            let worker = IngestLoop::new(config.clone(), validator.clone(), gate.clone());
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = worker.run(shutdown).await {
                    error!(worker = "ingest", error = %e, "worker_failed");
                }
            })
        });
    }

    // Counter loop: poll totalizers, persist occupancy
    {
        let config = config.clone();
        let transport = transport.clone();
        let ledger = ledger.clone();
        let shutdown = shutdown_rx.clone();
        watchdog.supervise("counter", move || {
            let shutdown = shutdown.clone();
            match CounterTracker::new(&config, transport.clone(), ledger.clone()) {
                Ok(tracker) => tokio::spawn(tracker.run(shutdown)),
                Err(e) => tokio::spawn(async move {
                    error!(worker = "counter", error = %e, "worker_failed");
                }),
            }
        });
    }

    tokio::spawn(watchdog.clone().run(shutdown_rx));

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);

    // Let an in-flight gate pulse finish before the runtime is dropped
    transport.quiesce().await;
    info!("parkgate shutdown complete");
    Ok(())
}
