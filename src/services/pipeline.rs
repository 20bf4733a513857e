//! Receipt validation pipeline
//!
//! Five independent checks, always all evaluated (no short-circuit - the
//! ledger records every failure, not just the first):
//! 1. duplicate use (skipped when duplicates are allowed by policy)
//! 2. time window (absent issue timestamp fails closed)
//! 3. online registry lookup (policy-gated)
//! 4. receipt type (only sales open the gate)
//! 5. fiscal drive allow-list
//!
//! The ledger entry is appended before the caller acts on the outcome, so
//! an actuator fault can never lose audit data.

use crate::domain::{Outcome, ReceiptRecord, SALE_RECEIPT_TYPE};
use crate::infra::config::Config;
use crate::infra::Ledger;
use crate::io::OnlineVerifier;
use chrono::Duration as TimeDelta;
use std::sync::Arc;
use tracing::debug;

/// The policy knobs of the pipeline, separated from the live handles so
/// tests can exercise check combinations directly.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    /// Skip the duplicate-use check entirely
    pub allow_duplicates: bool,
    /// Maximum receipt age, issue to arrival, in seconds
    pub window_secs: i64,
    /// Fiscal drive numbers allowed to open the gate
    pub fiscal_drives: Vec<String>,
}

impl ValidationPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allow_duplicates: config.allow_duplicates(),
            window_secs: config.window_secs(),
            fiscal_drives: config.fiscal_drives().to_vec(),
        }
    }
}

pub struct Validator {
    policy: ValidationPolicy,
    ledger: Arc<Ledger>,
    online: Option<OnlineVerifier>,
}

impl Validator {
    pub fn new(policy: ValidationPolicy, ledger: Arc<Ledger>, online: Option<OnlineVerifier>) -> Self {
        Self { policy, ledger, online }
    }

    /// Run every check, append the ledger entry, return the outcome.
    ///
    /// An online-lookup transport error aborts processing with no ledger
    /// entry; the worker dies and the watchdog restarts it.
    pub async fn process(&self, record: &ReceiptRecord) -> anyhow::Result<Outcome> {
        let mut outcome = Outcome::OK;

        if !self.policy.allow_duplicates && self.ledger.seen(&record.raw)? {
            outcome |= Outcome::DUPLICATE_USE;
        }

        if self.window_exceeded(record) {
            outcome |= Outcome::TIME_WINDOW_EXCEEDED;
        }

        if let Some(online) = &self.online {
            if !online.confirm(&record.fiscal_sign, &record.amount).await? {
                outcome |= Outcome::ONLINE_CHECK_FAILED;
            }
        }

        if record.receipt_type != SALE_RECEIPT_TYPE {
            outcome |= Outcome::WRONG_RECEIPT_TYPE;
        }

        if !self.policy.fiscal_drives.iter().any(|fd| fd == &record.fiscal_drive) {
            outcome |= Outcome::UNKNOWN_FISCAL_DRIVE;
        }

        debug!(outcome = %outcome, fiscal_drive = %record.fiscal_drive, "receipt_validated");

        // Persist before the caller can act on the decision
        self.ledger.record(record, outcome)?;

        Ok(outcome)
    }

    /// A receipt older than the window - or with no parseable issue time -
    /// is stale. A future-dated receipt passes; clock skew between fiscal
    /// devices and this host is tolerated.
    fn window_exceeded(&self, record: &ReceiptRecord) -> bool {
        match record.issued_at {
            Some(issued) => {
                record.arrived_at.signed_duration_since(issued)
                    > TimeDelta::seconds(self.policy.window_secs)
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::receipt::decode;
    use chrono::{NaiveDate, NaiveDateTime};

    const PAYLOAD: &str = "t=20240101T1200&s=1.00&fn=ABC&i=1&fp=999&n=1";

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn policy() -> ValidationPolicy {
        ValidationPolicy {
            allow_duplicates: false,
            window_secs: 600,
            fiscal_drives: vec!["ABC".to_string()],
        }
    }

    fn validator(policy: ValidationPolicy) -> Validator {
        Validator::new(policy, Arc::new(Ledger::open_in_memory().unwrap()), None)
    }

    #[tokio::test]
    async fn test_valid_receipt_accepted() {
        let validator = validator(policy());
        let record = decode(PAYLOAD, at(12, 5)).unwrap();

        let outcome = validator.process(&record).await.unwrap();
        assert_eq!(outcome, Outcome::OK);
        assert!(validator.ledger.seen(PAYLOAD).unwrap());
    }

    #[tokio::test]
    async fn test_resubmission_is_duplicate_only() {
        let validator = validator(policy());
        let record = decode(PAYLOAD, at(12, 5)).unwrap();

        assert_eq!(validator.process(&record).await.unwrap(), Outcome::OK);
        let outcome = validator.process(&record).await.unwrap();
        assert_eq!(outcome, Outcome::DUPLICATE_USE);
    }

    #[tokio::test]
    async fn test_duplicates_allowed_by_policy() {
        let mut p = policy();
        p.allow_duplicates = true;
        let validator = validator(p);
        let record = decode(PAYLOAD, at(12, 5)).unwrap();

        assert_eq!(validator.process(&record).await.unwrap(), Outcome::OK);
        assert_eq!(validator.process(&record).await.unwrap(), Outcome::OK);
    }

    #[tokio::test]
    async fn test_wrong_type_and_unknown_drive_both_flagged() {
        let validator = validator(policy());
        let record =
            decode("t=20240101T1200&s=1.00&fn=XYZ&i=1&fp=999&n=2", at(12, 5)).unwrap();

        let outcome = validator.process(&record).await.unwrap();
        assert!(outcome.contains(Outcome::WRONG_RECEIPT_TYPE));
        assert!(outcome.contains(Outcome::UNKNOWN_FISCAL_DRIVE));
        assert!(!outcome.contains(Outcome::TIME_WINDOW_EXCEEDED));
        assert!(!outcome.contains(Outcome::DUPLICATE_USE));
    }

    #[tokio::test]
    async fn test_window_boundary() {
        let validator = validator(policy());

        // Exactly at the window edge: not exceeded
        let record = decode(PAYLOAD, at(12, 10)).unwrap();
        let outcome = validator.process(&record).await.unwrap();
        assert!(!outcome.contains(Outcome::TIME_WINDOW_EXCEEDED));

        // One minute past: exceeded
        let record = decode("t=20240101T1200&s=2.00&fn=ABC&i=2&fp=998&n=1", at(12, 11)).unwrap();
        let outcome = validator.process(&record).await.unwrap();
        assert!(outcome.contains(Outcome::TIME_WINDOW_EXCEEDED));
    }

    #[tokio::test]
    async fn test_absent_issue_time_fails_closed() {
        let validator = validator(policy());
        let record = decode("t=badstamp&s=1.00&fn=ABC&i=1&fp=999&n=1", at(12, 5)).unwrap();
        assert_eq!(record.issued_at, None);

        let outcome = validator.process(&record).await.unwrap();
        assert!(outcome.contains(Outcome::TIME_WINDOW_EXCEEDED));
    }

    #[tokio::test]
    async fn test_future_dated_receipt_passes_window() {
        let validator = validator(policy());
        // Issued at 12:00, arrived at 11:00 - tolerated
        let record = decode(PAYLOAD, at(11, 0)).unwrap();

        let outcome = validator.process(&record).await.unwrap();
        assert!(!outcome.contains(Outcome::TIME_WINDOW_EXCEEDED));
    }

    #[tokio::test]
    async fn test_every_outcome_is_ledgered() {
        let validator = validator(policy());
        let rejected =
            decode("t=20240101T1200&s=1.00&fn=XYZ&i=1&fp=999&n=2", at(12, 5)).unwrap();
        validator.process(&rejected).await.unwrap();

        let entries = validator.ledger.entries_for_raw(&rejected.raw).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].outcome.contains(Outcome::WRONG_RECEIPT_TYPE));
    }
}
