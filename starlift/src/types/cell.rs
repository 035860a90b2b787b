//! Scalar cell values for tabular data.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Format used for timestamp cells in staged CSV, chosen to round-trip the
/// source database's microsecond-precision `last_updated` values.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format used for date cells.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format used for time-of-day cells.
pub const TIME_FORMAT: &str = "%H:%M:%S%.6f";

/// A single typed value in a [`crate::types::TableRow`].
///
/// The variants cover what the operational source actually produces: nulls,
/// booleans, integers, decimals, text and the calendar types. Values read
/// back from staged CSV are inferred (see [`Cell::from_csv_field`]);
/// authoritative typing happens when a table is encoded to parquet.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Cell {
    /// Returns true for the missing-value marker.
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Returns the value as an integer if it is one, or parses as one.
    ///
    /// String cells are parsed so that identifiers survive the untyped CSV
    /// staging boundary; this is what the dimension joins key on.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::I64(value) => Some(*value),
            Cell::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the value as a timestamp if it is one, or parses as one.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::Timestamp(value) => Some(*value),
            Cell::String(value) => parse_timestamp(value),
            _ => None,
        }
    }

    /// Renders the cell as a CSV field. Nulls become the empty field.
    pub fn to_csv_field(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Bool(value) => value.to_string(),
            Cell::I64(value) => value.to_string(),
            Cell::F64(value) => value.to_string(),
            Cell::String(value) => value.clone(),
            Cell::Date(value) => value.format(DATE_FORMAT).to_string(),
            Cell::Time(value) => value.format(TIME_FORMAT).to_string(),
            Cell::Timestamp(value) => value.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Infers a cell from a CSV field.
    ///
    /// Empty fields are nulls. Integer inference requires the text to
    /// round-trip, so zero-padded values such as postal codes stay strings
    /// instead of silently losing their leading zeros.
    pub fn from_csv_field(field: &str) -> Cell {
        if field.is_empty() {
            return Cell::Null;
        }

        if let Ok(value) = field.parse::<i64>() {
            if value.to_string() == field {
                return Cell::I64(value);
            }
            return Cell::String(field.to_string());
        }

        if looks_numeric(field) {
            if let Ok(value) = field.parse::<f64>() {
                return Cell::F64(value);
            }
        }

        Cell::String(field.to_string())
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_csv_field())
    }
}

/// Parses a timestamp in either the staged CSV format or ISO-8601 with a `T`
/// separator, at any sub-second precision.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// Guards float inference: only digits, one dot and an optional leading sign,
/// with no leading zero padding. Keeps values such as `08841` or `1e5`
/// textual.
fn looks_numeric(field: &str) -> bool {
    let unsigned = field.strip_prefix('-').unwrap_or(field);
    if unsigned.starts_with('0') && !unsigned.starts_with("0.") {
        return false;
    }

    let mut dots = 0;
    for ch in unsigned.chars() {
        match ch {
            '.' => dots += 1,
            '0'..='9' => {}
            _ => return false,
        }
    }

    dots == 1 && !unsigned.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_inference_keeps_padded_identifiers_textual() {
        assert_eq!(Cell::from_csv_field("28441"), Cell::I64(28441));
        assert_eq!(
            Cell::from_csv_field("08841"),
            Cell::String("08841".to_string())
        );
        assert_eq!(
            Cell::from_csv_field("04524-5341"),
            Cell::String("04524-5341".to_string())
        );
        assert_eq!(Cell::from_csv_field("2.19"), Cell::F64(2.19));
        assert_eq!(Cell::from_csv_field(""), Cell::Null);
    }

    #[test]
    fn timestamps_round_trip_through_csv_fields() {
        let ts = parse_timestamp("2024-05-20 12:10:03.998128").unwrap();
        let field = Cell::Timestamp(ts).to_csv_field();
        assert_eq!(field, "2024-05-20 12:10:03.998128");
        assert_eq!(Cell::from_csv_field(&field).as_timestamp(), Some(ts));
    }

    #[test]
    fn string_cells_parse_to_join_keys() {
        assert_eq!(Cell::String("2".to_string()).as_i64(), Some(2));
        assert_eq!(Cell::I64(7).as_i64(), Some(7));
        assert_eq!(Cell::String("Facilities".to_string()).as_i64(), None);
    }
}
