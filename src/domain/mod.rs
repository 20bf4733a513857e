//! Domain models - receipt payloads and validation outcomes
//!
//! This module contains the canonical data types used throughout the system:
//! - `ReceiptRecord` - one decoded scanner event, immutable after construction
//! - `DecodeError` - hard decode failures (the line is discarded)
//! - `Outcome` - bitmask of independently-set validation failure flags

pub mod outcome;
pub mod receipt;

// Re-export commonly used types
pub use outcome::Outcome;
pub use receipt::{decode, DecodeError, ReceiptRecord, SALE_RECEIPT_TYPE};
