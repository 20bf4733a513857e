//! Fiscal receipt decoding
//!
//! Payload format (one line per scan, fields delimited by `&`):
//! - `t=YYYYMMDDTHHMM` - issue timestamp (first 15 chars consumed)
//! - `s=` - amount
//! - `fn=` - fiscal drive number
//! - `i=` - fiscal document number
//! - `fp=` - fiscal sign
//! - `n=` - receipt type (1 = sale)

use chrono::NaiveDateTime;
use std::fmt;

/// Number of `&`-delimited fields in a well-formed payload.
pub const RECEIPT_FIELDS: usize = 6;

/// Receipt type accepted by the pipeline.
pub const SALE_RECEIPT_TYPE: i64 = 1;

const ISSUED_AT_FORMAT: &str = "t=%Y%m%dT%H%M";
const ISSUED_AT_LEN: usize = 15;

/// One scanned event. Constructed once per decoded line, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptRecord {
    /// Exact decoded text as received. Primary key for duplicate lookup -
    /// duplicate detection is exact-string, not field-based.
    pub raw: String,
    /// Issue timestamp from the payload; `None` when malformed. The time
    /// window check fails closed for such records.
    pub issued_at: Option<NaiveDateTime>,
    pub amount: String,
    pub fiscal_drive: String,
    pub fiscal_document: String,
    pub fiscal_sign: String,
    pub receipt_type: i64,
    /// Wall-clock time the daemon finished decoding the line.
    pub arrived_at: NaiveDateTime,
}

/// Hard decode failure. The line is discarded with no ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload did not split into exactly six fields.
    FieldCount(usize),
    /// Receipt type field did not parse as an integer.
    ReceiptType(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::FieldCount(n) => {
                write!(f, "expected {} fields, got {}", RECEIPT_FIELDS, n)
            }
            DecodeError::ReceiptType(field) => {
                write!(f, "receipt type field not an integer: {:?}", field)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

fn strip_tag<'a>(field: &'a str, tag: &str) -> &'a str {
    field.strip_prefix(tag).unwrap_or(field)
}

/// Decode one raw scanner line into a [`ReceiptRecord`].
///
/// A malformed `t=` field is not fatal - `issued_at` is recorded as absent.
/// A wrong field count or a non-integer `n=` field fails the whole line.
pub fn decode(raw: &str, arrived_at: NaiveDateTime) -> Result<ReceiptRecord, DecodeError> {
    let fields: Vec<&str> = raw.split('&').collect();
    if fields.len() != RECEIPT_FIELDS {
        return Err(DecodeError::FieldCount(fields.len()));
    }

    let issued_at = fields[0]
        .get(..ISSUED_AT_LEN)
        .and_then(|s| NaiveDateTime::parse_from_str(s, ISSUED_AT_FORMAT).ok());

    let receipt_type = strip_tag(fields[5], "n=")
        .parse::<i64>()
        .map_err(|_| DecodeError::ReceiptType(fields[5].to_string()))?;

    Ok(ReceiptRecord {
        raw: raw.to_string(),
        issued_at,
        amount: strip_tag(fields[1], "s=").to_string(),
        fiscal_drive: strip_tag(fields[2], "fn=").to_string(),
        fiscal_document: strip_tag(fields[3], "i=").to_string(),
        fiscal_sign: strip_tag(fields[4], "fp=").to_string(),
        receipt_type,
        arrived_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn arrived() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(12, 5, 0).unwrap()
    }

    #[test]
    fn test_decode_well_formed_payload() {
        let raw = "t=20240101T1200&s=1.00&fn=ABC&i=1&fp=999&n=1";
        let record = decode(raw, arrived()).unwrap();

        assert_eq!(record.raw, raw);
        assert_eq!(
            record.issued_at,
            Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap())
        );
        assert_eq!(record.amount, "1.00");
        assert_eq!(record.fiscal_drive, "ABC");
        assert_eq!(record.fiscal_document, "1");
        assert_eq!(record.fiscal_sign, "999");
        assert_eq!(record.receipt_type, SALE_RECEIPT_TYPE);
        assert_eq!(record.arrived_at, arrived());
    }

    #[test]
    fn test_decode_rejects_wrong_field_count() {
        assert_eq!(
            decode("t=20240101T1200&s=1.00&n=1", arrived()),
            Err(DecodeError::FieldCount(3))
        );
        assert_eq!(
            decode("t=20240101T1200&s=1.00&fn=A&i=1&fp=9&n=1&x=2", arrived()),
            Err(DecodeError::FieldCount(7))
        );
        assert!(matches!(decode("", arrived()), Err(DecodeError::FieldCount(1))));
    }

    #[test]
    fn test_decode_malformed_timestamp_is_absent() {
        let record = decode("t=garbage-stamp&s=1.00&fn=ABC&i=1&fp=999&n=1", arrived()).unwrap();
        assert_eq!(record.issued_at, None);

        // Too short to slice 15 chars
        let record = decode("t=2024&s=1.00&fn=ABC&i=1&fp=999&n=1", arrived()).unwrap();
        assert_eq!(record.issued_at, None);
    }

    #[test]
    fn test_decode_timestamp_ignores_trailing_chars() {
        // Only the first 15 characters of the field are consumed.
        let record =
            decode("t=20240101T1200Z-extra&s=1.00&fn=ABC&i=1&fp=999&n=1", arrived()).unwrap();
        assert!(record.issued_at.is_some());
    }

    #[test]
    fn test_decode_non_integer_type_is_fatal() {
        assert!(matches!(
            decode("t=20240101T1200&s=1.00&fn=ABC&i=1&fp=999&n=x", arrived()),
            Err(DecodeError::ReceiptType(_))
        ));
    }

    #[test]
    fn test_decode_missing_prefixes_kept_verbatim() {
        // Prefix stripping is best-effort; a field without its tag is taken as-is.
        let record = decode("t=20240101T1200&1.00&ABC&1&999&n=2", arrived()).unwrap();
        assert_eq!(record.amount, "1.00");
        assert_eq!(record.fiscal_drive, "ABC");
        assert_eq!(record.receipt_type, 2);
    }
}
