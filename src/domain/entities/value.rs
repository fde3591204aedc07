use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATETIME_FORMATS: [&str; 3] = [DATETIME_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const ZONED_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z"];

/// A single cell value in a row snapshot.
///
/// The `Display` form is the canonical textual representation used by the
/// textual comparator and by the store when matching keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Text,
    Date,
    DateTime,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Date => "date",
            ValueKind::DateTime => "datetime",
        }
    }

    pub fn parse(tag: &str) -> Option<ValueKind> {
        match tag {
            "null" => Some(ValueKind::Null),
            "bool" => Some(ValueKind::Bool),
            "int" => Some(ValueKind::Int),
            "float" => Some(ValueKind::Float),
            "text" => Some(ValueKind::Text),
            "date" => Some(ValueKind::Date),
            "datetime" => Some(ValueKind::DateTime),
            _ => None,
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Date(_) => ValueKind::Date,
            Value::DateTime(_) => ValueKind::DateTime,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Rebuilds a value from its kind tag and canonical text.
    ///
    /// Returns `None` when `raw` is not a valid rendering of `kind`.
    pub fn decode(kind: ValueKind, raw: Option<&str>) -> Option<Value> {
        match (kind, raw) {
            (ValueKind::Null, _) => Some(Value::Null),
            (_, None) => None,
            (ValueKind::Bool, Some(raw)) => raw.parse().ok().map(Value::Bool),
            (ValueKind::Int, Some(raw)) => raw.parse().ok().map(Value::Int),
            (ValueKind::Float, Some(raw)) => raw.parse().ok().map(Value::Float),
            (ValueKind::Text, Some(raw)) => Some(Value::Text(raw.to_string())),
            (ValueKind::Date, Some(raw)) => {
                NaiveDate::parse_from_str(raw, DATE_FORMAT).ok().map(Value::Date)
            }
            (ValueKind::DateTime, Some(raw)) => NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
                .ok()
                .map(Value::DateTime),
        }
    }

    /// Interprets a user-typed literal: `null`, booleans, integers, floats,
    /// ISO dates and timestamps, and falls back to text.
    pub fn parse_literal(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Value::Null;
        }
        if let Ok(flag) = trimmed.parse::<bool>() {
            return Value::Bool(flag);
        }
        if let Ok(int) = trimmed.parse::<i64>() {
            return Value::Int(int);
        }
        // `inf` and `nan` parse as f64 but are almost always meant as text.
        if trimmed.chars().any(|c| c.is_ascii_digit()) {
            if let Ok(float) = trimmed.parse::<f64>() {
                return Value::Float(float);
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
            return Value::Date(date);
        }
        if let Some(stamp) = parse_datetime(trimmed) {
            return Value::DateTime(stamp);
        }
        Value::Text(raw.to_string())
    }

    /// The value as a point in time, when it is (or reads as) a date.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(date) => Some(date.and_time(NaiveTime::MIN)),
            Value::DateTime(stamp) => Some(*stamp),
            Value::Text(text) => {
                let text = text.trim();
                NaiveDate::parse_from_str(text, DATE_FORMAT)
                    .ok()
                    .map(|date| date.and_time(NaiveTime::MIN))
                    .or_else(|| parse_datetime(text))
            }
            _ => None,
        }
    }
}

/// Naive formats first, then offset-suffixed ones (`Z`, `+00:00`, `+0100`).
/// An offset is dropped and the wall-clock time kept.
fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|stamp| stamp.naive_local())
        })
        .or_else(|| {
            ZONED_FORMATS.iter().find_map(|format| {
                DateTime::parse_from_str(raw, format)
                    .ok()
                    .map(|stamp| stamp.naive_local())
            })
        })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(flag) => write!(f, "{flag}"),
            Value::Int(int) => write!(f, "{int}"),
            Value::Float(float) => write!(f, "{float}"),
            Value::Text(text) => f.write_str(text),
            Value::Date(date) => write!(f, "{}", date.format(DATE_FORMAT)),
            Value::DateTime(stamp) => write!(f, "{}", stamp.format(DATETIME_FORMAT)),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn display_uses_canonical_text() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Int(-42).to_string(), "-42");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Float(2.0).to_string(), "2");
        assert_eq!(Value::from("abc").to_string(), "abc");
        assert_eq!(Value::Date(date(2025, 3, 9)).to_string(), "2025-03-09");
        let stamp = date(2025, 3, 9).and_hms_opt(7, 5, 0).expect("valid time");
        assert_eq!(Value::DateTime(stamp).to_string(), "2025-03-09 07:05:00");
    }

    #[test]
    fn parse_literal_picks_narrowest_type() {
        assert_eq!(Value::parse_literal(""), Value::Null);
        assert_eq!(Value::parse_literal("null"), Value::Null);
        assert_eq!(Value::parse_literal("false"), Value::Bool(false));
        assert_eq!(Value::parse_literal("17"), Value::Int(17));
        assert_eq!(Value::parse_literal("17.25"), Value::Float(17.25));
        assert_eq!(Value::parse_literal("2024-02-29"), Value::Date(date(2024, 2, 29)));
        assert_eq!(
            Value::parse_literal("2024-02-29T10:00:00"),
            Value::DateTime(date(2024, 2, 29).and_hms_opt(10, 0, 0).expect("valid time"))
        );
        assert_eq!(Value::parse_literal("inf"), Value::from("inf"));
        assert_eq!(Value::parse_literal("open order"), Value::from("open order"));
    }

    #[test]
    fn decode_round_trips_every_kind() {
        let values = [
            Value::Null,
            Value::Bool(true),
            Value::Int(9),
            Value::Float(0.125),
            Value::from("x y"),
            Value::Date(date(2023, 12, 31)),
            Value::DateTime(date(2023, 12, 31).and_hms_opt(23, 59, 59).expect("valid time")),
        ];
        for value in values {
            let text = value.to_string();
            let raw = if value.is_null() { None } else { Some(text.as_str()) };
            let kind = ValueKind::parse(value.kind().as_str()).expect("known tag");
            assert_eq!(Value::decode(kind, raw), Some(value));
        }
    }

    #[test]
    fn decode_rejects_malformed_text() {
        assert_eq!(Value::decode(ValueKind::Int, Some("x")), None);
        assert_eq!(Value::decode(ValueKind::Date, None), None);
    }

    #[test]
    fn text_reads_as_datetime() {
        let value = Value::from("2025-01-15 08:30:00");
        assert_eq!(
            value.as_datetime(),
            date(2025, 1, 15).and_hms_opt(8, 30, 0)
        );
        assert_eq!(Value::Int(20250115).as_datetime(), None);
    }

    #[test]
    fn offset_suffix_is_dropped_keeping_wall_clock() {
        let expected = date(2025, 1, 15).and_hms_opt(8, 30, 0);
        for raw in [
            "2025-01-15 08:30:00+00:00",
            "2025-01-15T08:30:00Z",
            "2025-01-15T08:30:00+05:30",
            "2025-01-15 08:30:00-0300",
        ] {
            assert_eq!(Value::from(raw).as_datetime(), expected, "{raw}");
        }
        assert_eq!(Value::from("2025-01-15 08:30:00+99").as_datetime(), None);
    }
}
