// Budget Entity - spending limit for a category over a period

use super::{next_value, Entity, UNCATEGORIZED_ID};
use crate::error::Result;
use crate::fields::{format_date, Field, FieldKind, FieldValue};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const PERIOD_NAMES: &[&str] = &["day", "month", "year"];

const FIELDS: &[Field] = &[
    Field::new("amount", FieldKind::Integer),
    Field::new(
        "category",
        FieldKind::Reference {
            table: "category",
            cascade: true,
        },
    ),
    Field::new("period", FieldKind::Choice(PERIOD_NAMES)),
];

// ============================================================================
// PERIOD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Month,
    Year,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Day, Period::Month, Period::Year];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Month => "month",
            Period::Year => "year",
        }
    }

    pub fn parse(text: &str) -> Option<Period> {
        match text {
            "day" => Some(Period::Day),
            "month" => Some(Period::Month),
            "year" => Some(Period::Year),
            _ => None,
        }
    }

    /// SQL LIKE pattern matching every stored date inside this period around `date`
    ///
    /// Example: month of 2024-05-17 → "2024-05-__"
    pub fn like_pattern(&self, date: NaiveDate) -> String {
        let day = format_date(date);
        match self {
            Period::Day => day,
            Period::Month => format!("{}-__", &day[..7]),
            Period::Year => format!("{}-__-__", &day[..4]),
        }
    }
}

// ============================================================================
// BUDGET ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub amount: i64,
    pub category: i64,
    pub period: Period,
    pub pk: i64,
}

impl Budget {
    pub fn new(amount: i64, category: i64, period: Period) -> Self {
        Budget {
            amount,
            category,
            period,
            pk: 0,
        }
    }
}

impl Entity for Budget {
    fn fields() -> &'static [Field] {
        FIELDS
    }

    fn pk(&self) -> i64 {
        self.pk
    }

    fn set_pk(&mut self, pk: i64) {
        self.pk = pk;
    }

    fn to_values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Integer(self.amount),
            FieldValue::Integer(self.category),
            FieldValue::from(self.period.as_str()),
        ]
    }

    fn from_values(pk: i64, values: Vec<FieldValue>) -> Result<Self> {
        let mut values = values.into_iter();
        Ok(Budget {
            amount: next_value(&mut values).as_i64().unwrap_or(0),
            category: next_value(&mut values).as_i64().unwrap_or(UNCATEGORIZED_ID),
            period: next_value(&mut values)
                .as_text()
                .and_then(Period::parse)
                .unwrap_or(Period::Month),
            pk,
        })
    }

    fn blank_values() -> Vec<FieldValue> {
        vec![
            FieldValue::Integer(0),
            FieldValue::Integer(UNCATEGORIZED_ID),
            FieldValue::from(Period::Month.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_patterns() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        assert_eq!(Period::Day.like_pattern(date), "2024-05-17");
        assert_eq!(Period::Month.like_pattern(date), "2024-05-__");
        assert_eq!(Period::Year.like_pattern(date), "2024-__-__");
    }

    #[test]
    fn test_period_names_match_choice_field() {
        for period in Period::ALL {
            assert!(PERIOD_NAMES.contains(&period.as_str()));
            assert_eq!(Period::parse(period.as_str()), Some(period));
        }
        assert_eq!(Period::parse("week"), None);
    }

    #[test]
    fn test_blank_budget_is_monthly() {
        let blank = Budget::from_values(1, Budget::blank_values()).unwrap();
        assert_eq!(blank.period, Period::Month);
        assert_eq!(blank.amount, 0);
    }
}
