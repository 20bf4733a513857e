//! Receipt ingestion loop
//!
//! The hot path of the daemon: once per scan tick, drain the scanner,
//! decode the line, run the validation pipeline, and - when accepted -
//! trigger the gate. The pulse is spawned off this loop so the scanner
//! keeps draining while the relay dwells.
//!
//! Decode failures discard the line with no ledger entry. A pipeline error
//! (online lookup transport fault, store fault) ends the loop; the watchdog
//! brings it back.

use crate::domain::receipt;
use crate::infra::config::Config;
use crate::io::Scanner;
use crate::services::gate::GateActuator;
use crate::services::pipeline::Validator;
use chrono::Local;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info};

pub struct IngestLoop {
    config: Config,
    validator: Arc<Validator>,
    gate: Arc<GateActuator>,
}

impl IngestLoop {
    pub fn new(config: Config, validator: Arc<Validator>, gate: Arc<GateActuator>) -> Self {
        Self { config, validator, gate }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut scanner = Scanner::new(&self.config);
        info!(
            device = %self.config.serial_device(),
            scan_interval_ms = self.config.scan_interval().as_millis() as u64,
            "ingest_started"
        );

        let mut tick = interval(self.config.scan_interval());
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("ingest_shutdown");
                        return Ok(());
                    }
                }
                _ = tick.tick() => {}
            }

            let line = scanner.poll_line().await;
            if line.is_empty() {
                continue;
            }
            info!(raw = %line, "receipt_scanned");

            let arrived_at = Local::now().naive_local();
            let record = match receipt::decode(&line, arrived_at) {
                Ok(record) => record,
                Err(e) => {
                    debug!(error = %e, "receipt_discarded");
                    continue;
                }
            };
            debug!(
                issued_at = ?record.issued_at,
                amount = %record.amount,
                fiscal_drive = %record.fiscal_drive,
                fiscal_document = %record.fiscal_document,
                fiscal_sign = %record.fiscal_sign,
                receipt_type = record.receipt_type,
                "receipt_decoded"
            );

            let outcome = self.validator.process(&record).await?;
            if outcome.accepted() {
                info!("receipt_accepted");
                let gate = self.gate.clone();
                tokio::spawn(async move {
                    gate.open().await;
                });
            } else {
                info!(outcome = %outcome, "receipt_rejected");
            }
        }
    }
}
