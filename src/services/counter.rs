//! Parking occupancy tracker
//!
//! The inductive loop controller exposes two increment-only totalizers
//! (vehicles in, vehicles out) as Modbus input registers. Each tick reads
//! both under the shared transport lock and persists `in - out` when it
//! changed.
//!
//! On startup the hardware totalizers are realigned with the persisted
//! occupancy so a daemon restart does not double-count prior activity:
//! write the occupancy and zero as the baseline register pair, pulse the
//! save coil, then the reset-in and reset-out coils. The sequence is
//! retried every tick until the controller is reachable.
//!
//! A fault during a tick is skipped silently until the next tick.

use crate::infra::config::Config;
use crate::infra::Ledger;
use crate::io::ModbusTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info};

pub struct CounterTracker {
    transport: Arc<ModbusTransport>,
    ledger: Arc<Ledger>,
    poll_interval: Duration,
    in_total_register: u16,
    out_total_register: u16,
    baseline_register: u16,
    save_coil: u16,
    reset_in_coil: u16,
    reset_out_coil: u16,
    coil_pulse: Duration,
    realigned: bool,
    current: i64,
}

/// Net occupancy from the totalizer pair, floored at zero. The upper bound
/// (lot capacity) is not enforced here.
pub fn occupancy_from_totals(vehicles_in: u16, vehicles_out: u16) -> i64 {
    (i64::from(vehicles_in) - i64::from(vehicles_out)).max(0)
}

impl CounterTracker {
    pub fn new(
        config: &Config,
        transport: Arc<ModbusTransport>,
        ledger: Arc<Ledger>,
    ) -> anyhow::Result<Self> {
        let current = ledger.load_occupancy()?;
        Ok(Self {
            transport,
            ledger,
            poll_interval: config.counter_poll_interval(),
            in_total_register: config.in_total_register(),
            out_total_register: config.out_total_register(),
            baseline_register: config.baseline_register(),
            save_coil: config.save_coil(),
            reset_in_coil: config.reset_in_coil(),
            reset_out_coil: config.reset_out_coil(),
            coil_pulse: config.coil_pulse(),
            realigned: false,
            current,
        })
    }

    /// Last occupancy this tracker observed (persisted value at startup).
    pub fn occupancy(&self) -> i64 {
        self.current
    }

    /// One poll cycle: realign first if still pending, then read the
    /// totalizers and persist the derived occupancy on change.
    pub async fn tick(&mut self) -> anyhow::Result<()> {
        if !self.realigned {
            self.realign().await?;
            self.realigned = true;
            info!(occupancy = self.current, "counter_realigned");
        }

        let mut session = self.transport.session().await?;
        let vehicles_in = session.read_input_register(self.in_total_register).await?;
        let vehicles_out = session.read_input_register(self.out_total_register).await?;
        session.close().await;

        let occupancy = occupancy_from_totals(vehicles_in, vehicles_out);
        if occupancy != self.current {
            info!(
                previous = self.current,
                occupancy,
                vehicles_in,
                vehicles_out,
                "occupancy_changed"
            );
            self.ledger.store_occupancy(occupancy)?;
            self.current = occupancy;
        }
        Ok(())
    }

    /// Realign the hardware totalizers with the persisted occupancy.
    async fn realign(&mut self) -> anyhow::Result<()> {
        let baseline = self.current.clamp(0, i64::from(u16::MAX)) as u16;
        let mut session = self.transport.session().await?;
        session.write_registers(self.baseline_register, &[baseline, 0]).await?;
        session.pulse_coil(self.save_coil, self.coil_pulse).await?;
        session.pulse_coil(self.reset_in_coil, self.coil_pulse).await?;
        session.pulse_coil(self.reset_out_coil, self.coil_pulse).await?;
        session.close().await;
        Ok(())
    }

    /// Poll loop. Runs until shutdown; individual tick faults are skipped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            addr = %self.transport.addr(),
            poll_secs = self.poll_interval.as_secs(),
            occupancy = self.current,
            "counter_tracker_started"
        );
        let mut tick = interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("counter_tracker_shutdown");
                        return;
                    }
                }
                _ = tick.tick() => {}
            }

            if let Err(e) = self.tick().await {
                debug!(error = %e, "counter_tick_skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupancy_is_in_minus_out() {
        assert_eq!(occupancy_from_totals(0, 0), 0);
        assert_eq!(occupancy_from_totals(12, 5), 7);
        assert_eq!(occupancy_from_totals(5, 5), 0);
    }

    #[test]
    fn test_occupancy_floors_at_zero() {
        // More exits than entries (missed pulses): never goes negative
        assert_eq!(occupancy_from_totals(3, 9), 0);
    }

    #[tokio::test]
    async fn test_tracker_starts_from_persisted_occupancy() {
        let ledger = Arc::new(Ledger::open_in_memory().unwrap());
        ledger.store_occupancy(42).unwrap();
        let transport = Arc::new(ModbusTransport::new(
            "127.0.0.1:502".to_string(),
            Duration::from_secs(1),
        ));

        let tracker = CounterTracker::new(&Config::default(), transport, ledger).unwrap();
        assert_eq!(tracker.occupancy(), 42);
        assert!(!tracker.realigned);
    }
}
