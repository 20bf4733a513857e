//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `scanner` - Serial line source for the barcode/QR scanner
//! - `modbus` - Shared Modbus TCP transport (barrier relay, loop counters)
//! - `online` - HTTP client for the external receipt registry

pub mod modbus;
pub mod online;
pub mod scanner;

// Re-export commonly used types
pub use modbus::{ModbusSession, ModbusTransport};
pub use online::OnlineVerifier;
pub use scanner::Scanner;
