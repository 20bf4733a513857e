//! Parking barrier access-control daemon library
//!
//! Exposes modules for integration testing and the status dashboard:
//! - `domain/` - Receipt payloads and validation outcomes
//! - `io/` - External interfaces (serial scanner, Modbus, receipt registry)
//! - `services/` - Validation pipeline, gate, counter, watchdog
//! - `infra/` - Configuration and the SQLite ledger

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
