//! Durable receipt ledger and occupancy store backed by SQLite
//!
//! Two tables survive process restart:
//! - `receipts` - append-only, one row per processed receipt (success or
//!   failure), indexed by raw payload text for duplicate lookup
//! - `occupancy` - single row holding the current vehicle count
//!
//! The ledger is the source of truth for duplicate detection and the read
//! interface consumed by the status dashboard. Rows are never updated;
//! resubmitting a payload only appends.

use crate::domain::{Outcome, ReceiptRecord};
use anyhow::Context;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One persisted row: the receipt, its validation outcome, and when it was
/// stored.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub raw: String,
    pub stored_at: NaiveDateTime,
    pub outcome: Outcome,
    pub issued_at: Option<NaiveDateTime>,
    pub amount: String,
    pub fiscal_drive: String,
    pub fiscal_document: String,
    pub fiscal_sign: String,
    pub receipt_type: i64,
}

pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    /// Open (or create) the store at `path` and initialize the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store {}", path.display()))?;
        Self::init_schema(&conn).context("Failed to initialize store schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store, used by tests and dry runs.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::init_schema(&conn).context("Failed to initialize store schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS receipts (
                raw TEXT NOT NULL,
                stored_at TEXT NOT NULL,
                outcome INTEGER NOT NULL,
                issued_at TEXT,
                amount TEXT NOT NULL,
                fiscal_drive TEXT NOT NULL,
                fiscal_document TEXT NOT NULL,
                fiscal_sign TEXT NOT NULL,
                receipt_type INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_receipts_raw ON receipts(raw)", [])?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS occupancy (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                count INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute("INSERT OR IGNORE INTO occupancy (id, count) VALUES (0, 0)", [])?;
        Ok(())
    }

    /// Append one entry. Called for every processed receipt, accepted or not,
    /// before the open decision is acted on.
    pub fn record(&self, record: &ReceiptRecord, outcome: Outcome) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO receipts
                (raw, stored_at, outcome, issued_at, amount,
                 fiscal_drive, fiscal_document, fiscal_sign, receipt_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.raw,
                record.arrived_at.format(DATE_FORMAT).to_string(),
                outcome.bits() as i64,
                record.issued_at.map(|t| t.format(DATE_FORMAT).to_string()),
                record.amount,
                record.fiscal_drive,
                record.fiscal_document,
                record.fiscal_sign,
                record.receipt_type,
            ],
        )
        .context("Failed to append ledger entry")?;
        Ok(())
    }

    /// True when the exact raw payload has been processed before.
    pub fn seen(&self, raw: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM receipts WHERE raw = ?1 LIMIT 1", params![raw], |row| {
                row.get(0)
            })
            .optional()
            .context("Failed to query ledger for duplicate")?;
        Ok(found.is_some())
    }

    /// Dashboard query: entries stored within `[from, to]`, oldest first.
    pub fn entries_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> anyhow::Result<Vec<LedgerEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT raw, stored_at, outcome, issued_at, amount,
                    fiscal_drive, fiscal_document, fiscal_sign, receipt_type
             FROM receipts
             WHERE stored_at BETWEEN ?1 AND ?2
             ORDER BY stored_at",
        )?;
        let rows = stmt.query_map(
            params![from.format(DATE_FORMAT).to_string(), to.format(DATE_FORMAT).to_string()],
            row_to_entry,
        )?;
        collect_entries(rows)
    }

    /// Dashboard query: entries whose outcome has `flag` set, oldest first.
    pub fn entries_with_flag(&self, flag: Outcome) -> anyhow::Result<Vec<LedgerEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT raw, stored_at, outcome, issued_at, amount,
                    fiscal_drive, fiscal_document, fiscal_sign, receipt_type
             FROM receipts
             WHERE (outcome & ?1) != 0
             ORDER BY stored_at",
        )?;
        let rows = stmt.query_map(params![flag.bits() as i64], row_to_entry)?;
        collect_entries(rows)
    }

    /// All entries for the exact raw payload, oldest first.
    pub fn entries_for_raw(&self, raw: &str) -> anyhow::Result<Vec<LedgerEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT raw, stored_at, outcome, issued_at, amount,
                    fiscal_drive, fiscal_document, fiscal_sign, receipt_type
             FROM receipts
             WHERE raw = ?1
             ORDER BY stored_at",
        )?;
        let rows = stmt.query_map(params![raw], row_to_entry)?;
        collect_entries(rows)
    }

    /// Current persisted vehicle count.
    pub fn load_occupancy(&self) -> anyhow::Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT count FROM occupancy WHERE id = 0", [], |row| row.get(0))
            .context("Failed to load occupancy")
    }

    /// Persist a new vehicle count. Also the operator-override entry point.
    pub fn store_occupancy(&self, count: i64) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute("UPDATE occupancy SET count = ?1 WHERE id = 0", params![count])
            .context("Failed to store occupancy")?;
        Ok(())
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let stored_at: String = row.get(1)?;
    let issued_at: Option<String> = row.get(3)?;
    let outcome: i64 = row.get(2)?;
    Ok(LedgerEntry {
        raw: row.get(0)?,
        stored_at: NaiveDateTime::parse_from_str(&stored_at, DATE_FORMAT).unwrap_or_default(),
        outcome: Outcome::from_bits(outcome as u16),
        issued_at: issued_at
            .and_then(|t| NaiveDateTime::parse_from_str(&t, DATE_FORMAT).ok()),
        amount: row.get(4)?,
        fiscal_drive: row.get(5)?,
        fiscal_document: row.get(6)?,
        fiscal_sign: row.get(7)?,
        receipt_type: row.get(8)?,
    })
}

fn collect_entries(
    rows: impl Iterator<Item = rusqlite::Result<LedgerEntry>>,
) -> anyhow::Result<Vec<LedgerEntry>> {
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.context("Failed to read ledger row")?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::receipt::decode;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn sample(raw: &str, arrived: NaiveDateTime) -> ReceiptRecord {
        decode(raw, arrived).unwrap()
    }

    #[test]
    fn test_record_and_seen() {
        let ledger = Ledger::open_in_memory().unwrap();
        let record = sample("t=20240101T1200&s=1.00&fn=ABC&i=1&fp=999&n=1", at(12, 5));

        assert!(!ledger.seen(&record.raw).unwrap());
        ledger.record(&record, Outcome::OK).unwrap();
        assert!(ledger.seen(&record.raw).unwrap());
    }

    #[test]
    fn test_resubmission_appends_without_mutating() {
        let ledger = Ledger::open_in_memory().unwrap();
        let first = sample("t=20240101T1200&s=1.00&fn=ABC&i=1&fp=999&n=1", at(12, 5));
        ledger.record(&first, Outcome::OK).unwrap();

        let second = sample("t=20240101T1200&s=1.00&fn=ABC&i=1&fp=999&n=1", at(12, 7));
        ledger.record(&second, Outcome::DUPLICATE_USE).unwrap();

        let entries = ledger.entries_for_raw(&first.raw).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].outcome, Outcome::OK);
        assert_eq!(entries[0].stored_at, at(12, 5));
        assert_eq!(entries[1].outcome, Outcome::DUPLICATE_USE);
    }

    #[test]
    fn test_entries_between_filters_by_stored_date() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger
            .record(&sample("t=20240101T1200&s=1&fn=A&i=1&fp=1&n=1", at(10, 0)), Outcome::OK)
            .unwrap();
        ledger
            .record(&sample("t=20240101T1200&s=2&fn=B&i=2&fp=2&n=1", at(12, 0)), Outcome::OK)
            .unwrap();
        ledger
            .record(&sample("t=20240101T1200&s=3&fn=C&i=3&fp=3&n=1", at(14, 0)), Outcome::OK)
            .unwrap();

        let entries = ledger.entries_between(at(11, 0), at(13, 0)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, "2");
    }

    #[test]
    fn test_entries_with_flag_matches_any_set_bit() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger
            .record(&sample("t=20240101T1200&s=1&fn=A&i=1&fp=1&n=1", at(10, 0)), Outcome::OK)
            .unwrap();
        ledger
            .record(
                &sample("t=20240101T1200&s=2&fn=B&i=2&fp=2&n=2", at(11, 0)),
                Outcome::WRONG_RECEIPT_TYPE | Outcome::UNKNOWN_FISCAL_DRIVE,
            )
            .unwrap();
        ledger
            .record(
                &sample("t=20240101T1200&s=3&fn=C&i=3&fp=3&n=1", at(12, 0)),
                Outcome::DUPLICATE_USE,
            )
            .unwrap();

        let wrong_type = ledger.entries_with_flag(Outcome::WRONG_RECEIPT_TYPE).unwrap();
        assert_eq!(wrong_type.len(), 1);
        assert_eq!(wrong_type[0].amount, "2");

        let duplicates = ledger.entries_with_flag(Outcome::DUPLICATE_USE).unwrap();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].amount, "3");
    }

    #[test]
    fn test_occupancy_defaults_to_zero_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite");

        {
            let ledger = Ledger::open(&path).unwrap();
            assert_eq!(ledger.load_occupancy().unwrap(), 0);
            ledger.store_occupancy(17).unwrap();
        }

        // Survives reopen
        let ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.load_occupancy().unwrap(), 17);
    }

    #[test]
    fn test_receipts_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        let raw = "t=20240101T1200&s=1.00&fn=ABC&i=1&fp=999&n=1";

        {
            let ledger = Ledger::open(&path).unwrap();
            ledger.record(&sample(raw, at(12, 5)), Outcome::OK).unwrap();
        }

        let ledger = Ledger::open(&path).unwrap();
        assert!(ledger.seen(raw).unwrap());
    }
}
