//! Barrier gate actuator
//!
//! Pulses the gate relay coil for the configured dwell, holding the shared
//! transport lock for the whole pulse. Callable from the ingestion pipeline
//! and from an operator-triggered override at the same time: the second
//! caller waits on the lock, it is not dropped.
//!
//! A transport fault here is logged and swallowed - the receipt is already
//! ledgered as accepted by the time the pulse runs, so the ledger can show
//! success while the barrier never moved. No retry: a retry can re-pulse
//! the coil on a flaky link. Flagged for product-owner review.

use crate::infra::config::Config;
use crate::io::ModbusTransport;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct GateActuator {
    transport: Arc<ModbusTransport>,
    coil: u16,
    dwell: std::time::Duration,
}

impl GateActuator {
    pub fn new(transport: Arc<ModbusTransport>, config: &Config) -> Self {
        Self { transport, coil: config.gate_coil(), dwell: config.gate_dwell() }
    }

    /// Open the barrier once. Also the operator-override entry point.
    pub async fn open(&self) {
        let start = Instant::now();
        match self.pulse().await {
            Ok(()) => {
                info!(
                    coil = self.coil,
                    dwell_ms = self.dwell.as_millis() as u64,
                    total_ms = start.elapsed().as_millis() as u64,
                    "gate_opened"
                );
            }
            Err(e) => {
                warn!(coil = self.coil, error = %e, "gate_pulse_failed");
            }
        }
    }

    async fn pulse(&self) -> anyhow::Result<()> {
        let mut session = self.transport.session().await?;
        session.pulse_coil(self.coil, self.dwell).await?;
        session.close().await;
        Ok(())
    }
}
