//! Message Translation Helpers
//!
//! Shared building blocks for venue translators: explicit side tables,
//! decimal parsing with string/number tolerance, and timestamp
//! normalization with explicit unit handling.
//!
//! The numeric rules are strict on one point: an absent field stays
//! "unknown" (`None`), never zero. A zero price or volume invented during
//! translation would corrupt every downstream aggregate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::application::ports::TranslateError;
use crate::domain::message::{EventTime, Side};

pub mod wire;

pub use wire::{WireDialect, WireTranslator};

// =============================================================================
// Side Tables
// =============================================================================

/// Explicit, exhaustive mapping between vendor side codes and [`Side`].
///
/// An unmapped code is a translation error, not a silent default: a
/// misread side would flip the meaning of every trade it touches.
#[derive(Debug, Clone)]
pub struct SideTable {
    entries: Vec<(String, Side)>,
}

impl SideTable {
    /// Build a table from explicit `(code, side)` pairs.
    ///
    /// The first entry for each side is also used for encoding.
    #[must_use]
    pub fn new(entries: Vec<(String, Side)>) -> Self {
        Self { entries }
    }

    /// The common single-letter/word convention: `b`/`buy` and `s`/`sell`.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            ("b".to_string(), Side::Buy),
            ("buy".to_string(), Side::Buy),
            ("s".to_string(), Side::Sell),
            ("sell".to_string(), Side::Sell),
        ])
    }

    /// Decode a vendor code.
    ///
    /// # Errors
    ///
    /// [`TranslateError::UnmappedSide`] when the code has no entry.
    pub fn decode(&self, code: &str) -> Result<Side, TranslateError> {
        self.entries
            .iter()
            .find(|(c, _)| c == code)
            .map(|&(_, side)| side)
            .ok_or_else(|| TranslateError::UnmappedSide {
                code: code.to_string(),
            })
    }

    /// Encode a side as its primary vendor code.
    ///
    /// # Errors
    ///
    /// [`TranslateError::UnmappedSide`] when the table has no entry for the
    /// side (a misconfigured table).
    pub fn encode(&self, side: Side) -> Result<&str, TranslateError> {
        self.entries
            .iter()
            .find(|&&(_, s)| s == side)
            .map(|(c, _)| c.as_str())
            .ok_or_else(|| TranslateError::UnmappedSide {
                code: side.as_str().to_string(),
            })
    }
}

// =============================================================================
// Decimal Parsing
// =============================================================================

/// Parse a decimal from a vendor JSON value.
///
/// Venues deliver prices as strings (`"42000.10"`) or bare numbers; both are
/// accepted. Strings preserve every digit; numbers go through the literal's
/// textual form.
///
/// # Errors
///
/// [`TranslateError::InvalidNumber`] for any other shape or an unparseable
/// literal.
pub fn decimal_from_value(value: &serde_json::Value) -> Result<Decimal, TranslateError> {
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => {
            return Err(TranslateError::InvalidNumber {
                value: other.to_string(),
            });
        }
    };

    text.parse::<Decimal>()
        .map_err(|_| TranslateError::InvalidNumber { value: text })
}

pub(crate) fn de_opt_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => decimal_from_value(&value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// Timestamp Normalization
// =============================================================================

/// Unit of a vendor epoch timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeUnit {
    /// Unix seconds.
    Seconds,
    /// Unix milliseconds.
    #[default]
    Millis,
    /// Unix microseconds.
    Micros,
    /// Unix nanoseconds.
    Nanos,
}

impl TimeUnit {
    /// Convert a raw epoch value to UTC.
    ///
    /// Returns `None` for values outside the representable range.
    #[must_use]
    pub fn to_utc(self, raw: i64) -> Option<DateTime<Utc>> {
        match self {
            Self::Seconds => DateTime::from_timestamp(raw, 0),
            Self::Millis => DateTime::from_timestamp_millis(raw),
            Self::Micros => DateTime::from_timestamp_micros(raw),
            Self::Nanos => Some(DateTime::from_timestamp_nanos(raw)),
        }
    }
}

/// Normalize a vendor timestamp, substituting the receipt time when the
/// venue omitted it or sent garbage.
#[must_use]
pub fn normalize_time(
    unit: TimeUnit,
    raw: Option<i64>,
    received_at: DateTime<Utc>,
) -> EventTime {
    raw.and_then(|value| unit.to_utc(value)).map_or_else(
        || EventTime::substituted(received_at),
        EventTime::venue,
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("b", Side::Buy)]
    #[test_case("buy", Side::Buy)]
    #[test_case("s", Side::Sell)]
    #[test_case("sell", Side::Sell)]
    fn standard_side_codes(code: &str, expected: Side) {
        assert_eq!(SideTable::standard().decode(code).unwrap(), expected);
    }

    #[test]
    fn unmapped_side_is_an_error() {
        let err = SideTable::standard().decode("B").unwrap_err();
        assert!(matches!(err, TranslateError::UnmappedSide { code } if code == "B"));
    }

    #[test]
    fn encode_uses_primary_code() {
        let table = SideTable::standard();
        assert_eq!(table.encode(Side::Buy).unwrap(), "b");
        assert_eq!(table.encode(Side::Sell).unwrap(), "s");
    }

    #[test]
    fn encode_fails_on_incomplete_table() {
        let table = SideTable::new(vec![("b".to_string(), Side::Buy)]);
        assert!(table.encode(Side::Sell).is_err());
    }

    #[test]
    fn decimal_from_string_preserves_digits() {
        let value = serde_json::json!("42000.100000001");
        let parsed = decimal_from_value(&value).unwrap();
        assert_eq!(parsed.to_string(), "42000.100000001");
    }

    #[test]
    fn decimal_from_integer_number() {
        let value = serde_json::json!(1500);
        assert_eq!(decimal_from_value(&value).unwrap(), Decimal::from(1500));
    }

    #[test]
    fn decimal_rejects_other_shapes() {
        assert!(decimal_from_value(&serde_json::json!(true)).is_err());
        assert!(decimal_from_value(&serde_json::json!("not a number")).is_err());
        assert!(decimal_from_value(&serde_json::json!([1])).is_err());
    }

    #[test_case(TimeUnit::Seconds, 1_700_000_000)]
    #[test_case(TimeUnit::Millis, 1_700_000_000_000)]
    #[test_case(TimeUnit::Micros, 1_700_000_000_000_000)]
    #[test_case(TimeUnit::Nanos, 1_700_000_000_000_000_000)]
    fn units_agree_on_the_same_instant(unit: TimeUnit, raw: i64) {
        let utc = unit.to_utc(raw).unwrap();
        assert_eq!(utc.timestamp(), 1_700_000_000);
    }

    #[test]
    fn normalize_flags_missing_timestamps() {
        let received = Utc::now();

        let venue = normalize_time(TimeUnit::Millis, Some(1_700_000_000_000), received);
        assert!(!venue.substituted);
        assert_eq!(venue.timestamp.timestamp(), 1_700_000_000);

        let missing = normalize_time(TimeUnit::Millis, None, received);
        assert!(missing.substituted);
        assert_eq!(missing.timestamp, received);
    }

    #[test]
    fn normalize_flags_out_of_range_timestamps() {
        let received = Utc::now();
        let garbage = normalize_time(TimeUnit::Seconds, Some(i64::MAX), received);
        assert!(garbage.substituted);
    }
}
