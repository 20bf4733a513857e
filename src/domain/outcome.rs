//! Validation outcome bitmask
//!
//! Every check sets its own flag independently; a receipt is accepted only
//! when no flag is set. The numeric flag values are part of the ledger
//! encoding and must stay stable across releases.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitmask of validation failures. `Outcome::OK` (all bits clear) accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Outcome(u16);

impl Outcome {
    pub const OK: Outcome = Outcome(0);
    pub const ONLINE_CHECK_FAILED: Outcome = Outcome(1);
    pub const TIME_WINDOW_EXCEEDED: Outcome = Outcome(2);
    pub const UNKNOWN_FISCAL_DRIVE: Outcome = Outcome(4);
    pub const WRONG_RECEIPT_TYPE: Outcome = Outcome(8);
    pub const DUPLICATE_USE: Outcome = Outcome(16);

    /// True when no failure flag is set and the gate may open.
    pub fn accepted(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, flag: Outcome) -> bool {
        self.0 & flag.0 != 0
    }

    /// Raw bits as stored in the ledger.
    pub fn bits(self) -> u16 {
        self.0
    }

    /// Rebuild an outcome from its ledger encoding.
    pub fn from_bits(bits: u16) -> Outcome {
        Outcome(bits)
    }
}

impl BitOr for Outcome {
    type Output = Outcome;

    fn bitor(self, rhs: Outcome) -> Outcome {
        Outcome(self.0 | rhs.0)
    }
}

impl BitOrAssign for Outcome {
    fn bitor_assign(&mut self, rhs: Outcome) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.accepted() {
            return write!(f, "ok");
        }
        let mut parts = Vec::new();
        if self.contains(Outcome::DUPLICATE_USE) {
            parts.push("duplicate use");
        }
        if self.contains(Outcome::TIME_WINDOW_EXCEEDED) {
            parts.push("time window exceeded");
        }
        if self.contains(Outcome::ONLINE_CHECK_FAILED) {
            parts.push("online check failed");
        }
        if self.contains(Outcome::WRONG_RECEIPT_TYPE) {
            parts.push("wrong receipt type");
        }
        if self.contains(Outcome::UNKNOWN_FISCAL_DRIVE) {
            parts.push("unknown fiscal drive");
        }
        write!(f, "{}", parts.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_accepts() {
        assert!(Outcome::OK.accepted());
        assert!(!(Outcome::OK | Outcome::DUPLICATE_USE).accepted());
    }

    #[test]
    fn test_flags_are_additive() {
        let mut outcome = Outcome::OK;
        outcome |= Outcome::WRONG_RECEIPT_TYPE;
        outcome |= Outcome::UNKNOWN_FISCAL_DRIVE;
        assert!(outcome.contains(Outcome::WRONG_RECEIPT_TYPE));
        assert!(outcome.contains(Outcome::UNKNOWN_FISCAL_DRIVE));
        assert!(!outcome.contains(Outcome::DUPLICATE_USE));
        assert_eq!(outcome.bits(), 12);
    }

    #[test]
    fn test_bits_round_trip() {
        let outcome = Outcome::ONLINE_CHECK_FAILED | Outcome::TIME_WINDOW_EXCEEDED;
        assert_eq!(Outcome::from_bits(outcome.bits()), outcome);
    }

    #[test]
    fn test_display_decomposition() {
        assert_eq!(Outcome::OK.to_string(), "ok");
        let outcome = Outcome::DUPLICATE_USE | Outcome::UNKNOWN_FISCAL_DRIVE;
        assert_eq!(outcome.to_string(), "duplicate use | unknown fiscal drive");
    }
}
