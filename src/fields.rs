// 🏛️ Field Layer - declared columns, their kinds, and text coercion
// Every entity lists its columns once; schemas, SQL and validation are derived from that list.

use crate::error::{BookkeeperError, Result};
use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage format for every calendar date column.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// FIELD KINDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Signed integer (amounts are in currency minor units)
    Integer,
    /// Free text
    Text,
    /// Calendar date stored as YYYY-MM-DD text
    Date,
    /// Key of a row in `table`, entered by the user as that row's name
    Reference { table: &'static str, cascade: bool },
    /// Text restricted to a fixed set of values
    Choice(&'static [&'static str]),
}

impl FieldKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::Integer | FieldKind::Reference { .. } => "INTEGER",
            FieldKind::Text | FieldKind::Date | FieldKind::Choice(_) => "TEXT",
        }
    }

    /// Human-readable name used in error messages
    pub fn describe(&self) -> String {
        match self {
            FieldKind::Integer => "integer".to_string(),
            FieldKind::Text => "text".to_string(),
            FieldKind::Date => "date".to_string(),
            FieldKind::Reference { table, .. } => format!("{} name", table),
            FieldKind::Choice(options) => format!("one of {}", options.join(", ")),
        }
    }
}

// ============================================================================
// FIELD DEFINITION
// ============================================================================

/// One declared column of an entity (the `pk` column is implicit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Field { name, kind }
    }

    /// Column definition for CREATE TABLE
    pub fn column_sql(&self) -> String {
        match self.kind {
            FieldKind::Reference { table, cascade: true } => format!(
                "{} INTEGER REFERENCES {}(id) ON DELETE CASCADE ON UPDATE CASCADE",
                self.name, table
            ),
            kind => format!("{} {}", self.name, kind.sql_type()),
        }
    }
}

// ============================================================================
// FIELD VALUE
// ============================================================================

/// A single column value as it travels between entities, filters and SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            FieldValue::Text(text) => text.trim().parse().ok(),
            FieldValue::Null => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        self.as_text().and_then(parse_date)
    }

    /// Text form of the value; NULL becomes the empty string
    pub fn into_string(self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Integer(value) => value.to_string(),
            FieldValue::Text(text) => text,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Integer(value) => write!(f, "{}", value),
            FieldValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Text(format_date(value))
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            FieldValue::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
        })
    }
}

impl FromSql for FieldValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(FieldValue::Null),
            ValueRef::Integer(value) => Ok(FieldValue::Integer(value)),
            ValueRef::Real(value) => Ok(FieldValue::Integer(value as i64)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|text| FieldValue::Text(text.to_string()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

// ============================================================================
// DATES
// ============================================================================

/// Parse a strict `YYYY-MM-DD` calendar date.
///
/// The shape is checked before chrono sees the text, so `2024-1-5` is rejected
/// even though chrono would accept it. Impossible dates (`2024-13-40`) fail too.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let bytes = text.as_bytes();
    if bytes.len() != 10 {
        return None;
    }
    let shape_ok = bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    });
    if !shape_ok {
        return None;
    }
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Today in local time
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

// ============================================================================
// COERCION
// ============================================================================

/// Convert user-entered text into a value of `kind`.
///
/// `location` names the offending cell in error messages. Reference fields are
/// resolved against a repository by the commit coordinator, not here.
pub fn coerce(kind: FieldKind, raw: &str, location: &str) -> Result<FieldValue> {
    let type_error = || BookkeeperError::Type {
        location: location.to_string(),
        value: raw.to_string(),
        expected: kind.describe(),
    };

    match kind {
        FieldKind::Integer => raw
            .trim()
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| type_error()),
        FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
        FieldKind::Date => parse_date(raw.trim())
            .map(FieldValue::from)
            .ok_or_else(|| BookkeeperError::Format {
                location: location.to_string(),
                value: raw.to_string(),
            }),
        FieldKind::Choice(options) => {
            let value = raw.trim();
            if options.contains(&value) {
                Ok(FieldValue::Text(value.to_string()))
            } else {
                Err(type_error())
            }
        }
        FieldKind::Reference { table, .. } => Err(BookkeeperError::InvalidState(format!(
            "{} references must be resolved by name against the {} table",
            location, table
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_is_strict() {
        assert_eq!(
            parse_date("2024-02-29"),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert!(parse_date("2024-13-40").is_none());
        assert!(parse_date("2023-02-29").is_none());
        assert!(parse_date("2024-1-05").is_none());
        assert!(parse_date("05/01/2024").is_none());
        assert!(parse_date("2024-01-05 ").is_none());
        assert!(parse_date("").is_none());
    }

    #[test]
    fn test_coerce_integer() {
        assert_eq!(
            coerce(FieldKind::Integer, " -250 ", "row 1, column amount").unwrap(),
            FieldValue::Integer(-250)
        );

        let err = coerce(FieldKind::Integer, "12.5", "row 1, column amount").unwrap_err();
        assert!(matches!(err, BookkeeperError::Type { .. }));
        assert!(err.to_string().contains("row 1, column amount"));
    }

    #[test]
    fn test_coerce_date_reports_format_error() {
        let err = coerce(FieldKind::Date, "2024-13-40", "row 2, column date").unwrap_err();
        assert!(matches!(err, BookkeeperError::Format { .. }));

        assert_eq!(
            coerce(FieldKind::Date, "2024-03-01", "row 2, column date").unwrap(),
            FieldValue::Text("2024-03-01".to_string())
        );
    }

    #[test]
    fn test_coerce_choice() {
        const PERIODS: &[&str] = &["day", "month", "year"];
        assert_eq!(
            coerce(FieldKind::Choice(PERIODS), "month", "period").unwrap(),
            FieldValue::Text("month".to_string())
        );
        assert!(coerce(FieldKind::Choice(PERIODS), "week", "period").is_err());
    }

    #[test]
    fn test_reference_kind_is_not_coerced_locally() {
        let kind = FieldKind::Reference {
            table: "category",
            cascade: true,
        };
        let err = coerce(kind, "food", "row 1, column category").unwrap_err();
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_column_sql() {
        let parent = Field::new(
            "parent",
            FieldKind::Reference {
                table: "category",
                cascade: true,
            },
        );
        assert_eq!(
            parent.column_sql(),
            "parent INTEGER REFERENCES category(id) ON DELETE CASCADE ON UPDATE CASCADE"
        );
        assert_eq!(Field::new("comment", FieldKind::Text).column_sql(), "comment TEXT");
    }

    #[test]
    fn test_field_value_conversions() {
        assert_eq!(FieldValue::from(Some(3_i64)), FieldValue::Integer(3));
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
        assert_eq!(FieldValue::Text(" 7".to_string()).as_i64(), Some(7));
        assert_eq!(FieldValue::Null.into_string(), "");
    }
}
