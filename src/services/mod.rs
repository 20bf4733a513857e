//! Services - business logic and long-running workers
//!
//! This module contains the core logic of the daemon:
//! - `pipeline` - receipt validation checks and ledger append
//! - `ingest` - scan/decode/validate/actuate loop
//! - `gate` - barrier relay actuator
//! - `counter` - occupancy tracker over the loop-counter totalizers
//! - `watchdog` - worker supervision and restart

pub mod counter;
pub mod gate;
pub mod ingest;
pub mod pipeline;
pub mod watchdog;

// Re-export commonly used types
pub use counter::CounterTracker;
pub use gate::GateActuator;
pub use ingest::IngestLoop;
pub use pipeline::{ValidationPolicy, Validator};
pub use watchdog::Watchdog;
