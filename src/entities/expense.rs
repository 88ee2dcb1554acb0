// 💸 Expense Entity - one spend, filed under a category

use super::{next_value, Entity, UNCATEGORIZED_ID};
use crate::error::Result;
use crate::fields::{today, Field, FieldKind, FieldValue};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const FIELDS: &[Field] = &[
    Field::new("amount", FieldKind::Integer),
    Field::new(
        "category",
        FieldKind::Reference {
            table: "category",
            cascade: true,
        },
    ),
    Field::new("expense_date", FieldKind::Date),
    Field::new("date", FieldKind::Date),
    Field::new("comment", FieldKind::Text),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    /// Amount in currency minor units
    pub amount: i64,

    /// Category pk
    pub category: i64,

    /// When the money was spent
    pub expense_date: Option<NaiveDate>,

    /// When the record was entered (stored in the `date` column)
    pub recorded_date: Option<NaiveDate>,

    pub comment: String,

    pub pk: i64,
}

impl Expense {
    /// New unsaved expense spent and recorded today
    pub fn new(amount: i64, category: i64) -> Self {
        let now = today();
        Expense {
            amount,
            category,
            expense_date: Some(now),
            recorded_date: Some(now),
            comment: String::new(),
            pk: 0,
        }
    }

    pub fn on(mut self, expense_date: NaiveDate) -> Self {
        self.expense_date = Some(expense_date);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

impl Entity for Expense {
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
            FieldValue::from(self.expense_date),
            FieldValue::from(self.recorded_date),
            FieldValue::from(self.comment.as_str()),
        ]
    }

    // Cleared cells come back as NULL and read as the field defaults.
    fn from_values(pk: i64, values: Vec<FieldValue>) -> Result<Self> {
        let mut values = values.into_iter();
        Ok(Expense {
            amount: next_value(&mut values).as_i64().unwrap_or(0),
            category: next_value(&mut values).as_i64().unwrap_or(UNCATEGORIZED_ID),
            expense_date: next_value(&mut values).as_date(),
            recorded_date: next_value(&mut values).as_date(),
            comment: next_value(&mut values).into_string(),
            pk,
        })
    }

    // Recorded today; everything else waits for the user to fill it in.
    fn blank_values() -> Vec<FieldValue> {
        vec![
            FieldValue::Null,
            FieldValue::Integer(UNCATEGORIZED_ID),
            FieldValue::Null,
            FieldValue::from(today()),
            FieldValue::Null,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_expense_defaults_to_today() {
        let expense = Expense::new(50, UNCATEGORIZED_ID);
        assert_eq!(expense.pk, 0);
        assert_eq!(expense.expense_date, Some(today()));
        assert_eq!(expense.recorded_date, Some(today()));
        assert!(expense.comment.is_empty());
    }

    #[test]
    fn test_values_round_trip_in_declared_order() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let expense = Expense::new(-1250, 3).on(date).with_comment("lunch");

        let values = expense.to_values();
        assert_eq!(values.len(), Expense::fields().len());
        assert_eq!(values[2], FieldValue::Text("2024-05-17".to_string()));

        let back = Expense::from_values(7, values).unwrap();
        assert_eq!(back.pk, 7);
        assert_eq!(back.amount, -1250);
        assert_eq!(back.comment, "lunch");
    }

    #[test]
    fn test_blank_row_reads_as_uncategorized() {
        let blank = Expense::from_values(1, Expense::blank_values()).unwrap();
        assert_eq!(blank.amount, 0);
        assert_eq!(blank.category, UNCATEGORIZED_ID);
        assert_eq!(blank.expense_date, None);
        assert_eq!(blank.recorded_date, Some(today()));
    }
}
