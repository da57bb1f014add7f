//! Typed repository helpers
//!
//! Thin conversion layer between the domain records and the generic store
//! contract: one module per record type, each owning the row encoding for its
//! table. Drivers call these instead of assembling rows by hand.

pub mod jobs;
pub mod tasks;
pub mod workflows;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::contract::Row;

pub(crate) fn iso(instant: &DateTime<Utc>) -> Value {
    Value::String(instant.to_rfc3339())
}

pub(crate) fn opt_iso(instant: &Option<DateTime<Utc>>) -> Value {
    instant.as_ref().map(iso).unwrap_or(Value::Null)
}

pub(crate) fn opt_text(text: &Option<String>) -> Value {
    text.as_ref()
        .map(|t| Value::String(t.clone()))
        .unwrap_or(Value::Null)
}

pub(crate) fn opt_int(value: &Option<i64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

pub(crate) fn text(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn int(row: &Row, column: &str) -> Option<i64> {
    row.get(column).and_then(Value::as_i64)
}

pub(crate) fn instant(row: &Row, column: &str) -> Option<DateTime<Utc>> {
    text(row, column)
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

pub(crate) fn json_map(row: &Row, column: &str) -> Option<maestro_core::params::Params> {
    text(row, column).and_then(|raw| maestro_core::params::from_json_str(&raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_round_trip_preserves_subsecond_precision() {
        let now = Utc::now();
        let mut row = Row::new();
        row.insert("StartedAt".into(), iso(&now));
        assert_eq!(instant(&row, "StartedAt"), Some(now));
    }
}
