//! Value normalization for cross-store comparison.
//!
//! The two stores render the same data differently:
//! - Timestamps: the source keeps text with microseconds and a `+00` suffix,
//!   the target returns `timestamptz`. Both compare as `YYYY-MM-DD HH:MM:SS`
//!   in UTC, with sub-second precision and the zone qualifier dropped.
//! - UUIDs: compared in lowercase hyphenated form.
//! - NULL: distinct from every value, including the empty string.

use std::fmt;

use crate::core::value::{parse_timestamp, SqlValue};

/// Output format shared by both sides.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A value reduced to the form used for comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Null,
    Value(String),
}

impl fmt::Display for Normalized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Normalized::Null => f.write_str("NULL"),
            Normalized::Value(v) => write!(f, "{:?}", v),
        }
    }
}

/// Normalize a textual timestamp.
///
/// Parseable input is converted to UTC and formatted with
/// [`TIMESTAMP_FORMAT`]. Anything else is cut at the first `.` and returned
/// trimmed, which still drops a fractional part.
pub fn normalize_timestamp(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        None => raw.split('.').next().unwrap_or(raw).trim().to_string(),
    }
}

/// Normalize a decoded value.
pub fn normalize_value(value: &SqlValue) -> Normalized {
    let text = match value {
        SqlValue::Null(_) => return Normalized::Null,
        SqlValue::Uuid(u) => u.hyphenated().to_string().to_lowercase(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::F64(n) => n.to_string(),
        SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        SqlValue::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
    };
    Normalized::Value(text)
}
