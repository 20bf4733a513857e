//! Shared Modbus TCP transport
//!
//! The barrier relay and the loop counters live behind one Modbus endpoint
//! (unit id 1). Every user - gate actuator, counter tracker, operator
//! override - goes through this transport, which owns the single
//! mutual-exclusion lock. A session holds the lock for its whole lifetime,
//! so a second caller waits rather than being dropped, and a gate pulse is
//! never interleaved with a counter realignment.
//!
//! Connections are per-session: connect, operate, disconnect. Every
//! operation is bounded by the global op timeout.

use anyhow::{anyhow, Context as _};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

/// Unit/slave id of the barrier controller. Fixed by the hardware.
const UNIT_ID: Slave = Slave(1);

pub struct ModbusTransport {
    addr: String,
    op_timeout: Duration,
    lock: Mutex<()>,
}

/// Exclusive, connected session. Dropping it releases the lock and closes
/// the connection; callers must not hold it longer than necessary.
pub struct ModbusSession<'a> {
    _exclusive: MutexGuard<'a, ()>,
    ctx: Context,
    op_timeout: Duration,
}

impl ModbusTransport {
    pub fn new(addr: String, op_timeout: Duration) -> Self {
        Self { addr, op_timeout, lock: Mutex::new(()) }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Acquire the transport lock and connect. Blocks while another session
    /// (including a gate pulse dwell) is in progress.
    pub async fn session(&self) -> anyhow::Result<ModbusSession<'_>> {
        let exclusive = self.lock.lock().await;
        let socket: SocketAddr = self
            .addr
            .parse()
            .with_context(|| format!("Invalid Modbus address {}", self.addr))?;
        let ctx = tokio::time::timeout(self.op_timeout, tcp::connect_slave(socket, UNIT_ID))
            .await
            .map_err(|_| anyhow!("Modbus connect to {} timed out", self.addr))?
            .with_context(|| format!("Modbus connect to {} failed", self.addr))?;
        Ok(ModbusSession { _exclusive: exclusive, ctx, op_timeout: self.op_timeout })
    }

    /// Wait for any in-flight session to finish. Used at shutdown so a gate
    /// pulse completes instead of leaving the coil energized.
    pub async fn quiesce(&self) {
        let _ = self.lock.lock().await;
    }
}

impl ModbusSession<'_> {
    pub async fn write_coil(&mut self, addr: u16, on: bool) -> anyhow::Result<()> {
        match tokio::time::timeout(self.op_timeout, self.ctx.write_single_coil(addr, on)).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(exc))) => Err(anyhow!("Modbus exception writing coil {}: {:?}", addr, exc)),
            Ok(Err(e)) => Err(e).with_context(|| format!("Modbus write to coil {} failed", addr)),
            Err(_) => Err(anyhow!("Modbus write to coil {} timed out", addr)),
        }
    }

    /// Energize a coil for `dwell`, then release it. The transport lock is
    /// held across the dwell.
    pub async fn pulse_coil(&mut self, addr: u16, dwell: Duration) -> anyhow::Result<()> {
        self.write_coil(addr, true).await?;
        tokio::time::sleep(dwell).await;
        self.write_coil(addr, false).await?;
        Ok(())
    }

    pub async fn write_registers(&mut self, addr: u16, values: &[u16]) -> anyhow::Result<()> {
        match tokio::time::timeout(self.op_timeout, self.ctx.write_multiple_registers(addr, values))
            .await
        {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(exc))) => {
                Err(anyhow!("Modbus exception writing registers at {}: {:?}", addr, exc))
            }
            Ok(Err(e)) => {
                Err(e).with_context(|| format!("Modbus write to registers at {} failed", addr))
            }
            Err(_) => Err(anyhow!("Modbus write to registers at {} timed out", addr)),
        }
    }

    pub async fn read_input_register(&mut self, addr: u16) -> anyhow::Result<u16> {
        match tokio::time::timeout(self.op_timeout, self.ctx.read_input_registers(addr, 1)).await {
            Ok(Ok(Ok(values))) => values
                .first()
                .copied()
                .ok_or_else(|| anyhow!("Empty response reading input register {}", addr)),
            Ok(Ok(Err(exc))) => {
                Err(anyhow!("Modbus exception reading input register {}: {:?}", addr, exc))
            }
            Ok(Err(e)) => {
                Err(e).with_context(|| format!("Modbus read of input register {} failed", addr))
            }
            Err(_) => Err(anyhow!("Modbus read of input register {} timed out", addr)),
        }
    }

    /// Close the connection. Errors on close are of no consequence.
    pub async fn close(mut self) {
        let _ = self.ctx.disconnect().await;
    }
}
