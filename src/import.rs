// 📥 CSV Import - expense rows from a spreadsheet export
//
// Expected headers: amount, category, date, comment (only amount is required).
// Records are turned into grid changes so an import is validated exactly like
// hand-entered rows: all of it, before anything is written.

use crate::changes::Change;
use crate::error::Result;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExpenseRecord {
    pub amount: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Day of the spend, YYYY-MM-DD
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl ExpenseRecord {
    /// Changes that append this record as grid row `row`
    pub fn changes(&self, row: i64) -> Vec<Change> {
        let mut changes = vec![Change::add("amount", self.amount.as_str())];
        let cells = [
            ("category", &self.category),
            ("expense_date", &self.date),
            ("comment", &self.comment),
        ];
        for (column, value) in cells {
            if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                changes.push(Change::update(row, column, value));
            }
        }
        changes
    }
}

pub fn load_csv(csv_path: &Path) -> Result<Vec<ExpenseRecord>> {
    let rdr = csv::Reader::from_path(csv_path)?;
    read_records(rdr)
}

pub fn parse_csv<R: Read>(input: R) -> Result<Vec<ExpenseRecord>> {
    read_records(csv::Reader::from_reader(input))
}

fn read_records<R: Read>(mut rdr: csv::Reader<R>) -> Result<Vec<ExpenseRecord>> {
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: ExpenseRecord = result?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BookkeeperError;

    #[test]
    fn test_parse_csv_with_optional_columns() {
        let data = "amount,category,date,comment\n\
                    1250,food,2024-05-17,lunch\n\
                    300,,,\n";
        let records = parse_csv(data.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].category.as_deref(), Some("food"));
        assert_eq!(records[1].amount, "300");
        assert_eq!(records[1].date, None);
    }

    #[test]
    fn test_record_changes_fill_in_new_row() {
        let record = ExpenseRecord {
            amount: "1250".to_string(),
            category: Some("food".to_string()),
            date: None,
            comment: Some("lunch".to_string()),
        };

        assert_eq!(
            record.changes(4),
            vec![
                Change::add("amount", "1250"),
                Change::update(4, "category", "food"),
                Change::update(4, "comment", "lunch"),
            ]
        );
    }

    #[test]
    fn test_missing_amount_column_is_a_csv_error() {
        let data = "category,date\nfood,2024-05-17\n";
        let err = parse_csv(data.as_bytes()).unwrap_err();
        assert!(matches!(err, BookkeeperError::Csv(_)));
    }

    #[test]
    fn test_load_csv_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("expenses.csv");
        std::fs::write(&path, "amount\n10\n20\n").unwrap();

        let records = load_csv(&path).unwrap();
        assert_eq!(records.len(), 2);
    }
}
