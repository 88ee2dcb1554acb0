// 📒 Ledger - the store, its three repositories, and the sums the views show
//
// Every mutation goes through a change buffer and the commit coordinator.
// After a category batch that deleted something, the expense and budget
// tables are compacted: the store's cascade may have removed rows there.

use crate::changes::{Change, ChangeBuffer, TreeChange};
use crate::commit::{CommitCoordinator, CommitReport};
use crate::db::{self, Store};
use crate::entities::{Budget, Category, CategoryTree, Expense, Period};
use crate::error::{BookkeeperError, Result};
use crate::fields::today;
use crate::import::ExpenseRecord;
use crate::repository::{Repository, SqliteRepository};
use crate::settings::DateBasis;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;

/// Which expenses a category sum covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategorySelector {
    All,
    /// One category, matched by exact name
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetLine {
    pub period: Period,
    pub budgeted: i64,
    pub spent: i64,
    pub remaining: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub date: NaiveDate,
    pub day: i64,
    pub month: i64,
    pub year: i64,
    pub total: i64,
    pub budgets: Vec<BudgetLine>,
}

pub struct Ledger {
    store: Store,
    date_basis: DateBasis,
    expenses: SqliteRepository<Expense>,
    categories: SqliteRepository<Category>,
    budgets: SqliteRepository<Budget>,
}

impl Ledger {
    /// Open (and if needed initialise) the database at `path`
    pub fn open(path: impl Into<PathBuf>, date_basis: DateBasis) -> Result<Self> {
        let store = Store::open(path)?;
        tracing::debug!(path = %store.path().display(), ?date_basis, "opened ledger");
        Ok(Self::new(store, date_basis))
    }

    pub fn new(store: Store, date_basis: DateBasis) -> Self {
        Ledger {
            expenses: SqliteRepository::new(store.clone()),
            categories: SqliteRepository::new(store.clone()),
            budgets: SqliteRepository::new(store.clone()),
            store,
            date_basis,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn expenses(&self) -> &SqliteRepository<Expense> {
        &self.expenses
    }

    pub fn categories(&self) -> &SqliteRepository<Category> {
        &self.categories
    }

    pub fn budgets(&self) -> &SqliteRepository<Budget> {
        &self.budgets
    }

    pub fn category_tree(&self) -> Result<CategoryTree> {
        CategoryTree::load(&self.categories)
    }

    // ========================================================================
    // Sums
    // ========================================================================

    /// Spending in the current day, month or year
    pub fn sum_for_period(&self, period: Period) -> Result<i64> {
        self.sum_for_period_on(period, today())
    }

    pub fn sum_for_period_on(&self, period: Period, date: NaiveDate) -> Result<i64> {
        let conn = self.store.connect()?;
        db::sum_amount_like(&conn, self.date_basis.column(), &period.like_pattern(date))
    }

    pub fn sum_for_category(&self, selector: &CategorySelector) -> Result<i64> {
        match selector {
            CategorySelector::All => db::sum_amount(&self.store.connect()?),
            CategorySelector::Named(name) => {
                let category = self.find_category(name)?;
                db::sum_amount_for_categories(&self.store.connect()?, &[category.pk])
            }
        }
    }

    /// Spending in a category and everything below it
    pub fn sum_for_category_tree(&self, name: &str) -> Result<i64> {
        let tree = self.category_tree()?;
        let root = tree.find_by_name(name).ok_or_else(|| BookkeeperError::Reference {
            field: "Category".to_string(),
            value: name.to_string(),
        })?;

        let mut keys = vec![root.pk];
        keys.extend(tree.descendants(root.pk).iter().map(|c| c.pk));
        db::sum_amount_for_categories(&self.store.connect()?, &keys)
    }

    pub fn budget_report(&self) -> Result<Vec<BudgetLine>> {
        self.budget_report_on(today())
    }

    pub fn budget_report_on(&self, date: NaiveDate) -> Result<Vec<BudgetLine>> {
        let conn = self.store.connect()?;
        Period::ALL
            .iter()
            .map(|&period| {
                let budgeted = db::sum_budget(&conn, period.as_str())?;
                let spent = db::sum_amount_like(
                    &conn,
                    self.date_basis.column(),
                    &period.like_pattern(date),
                )?;
                Ok(BudgetLine {
                    period,
                    budgeted,
                    spent,
                    remaining: budgeted - spent,
                })
            })
            .collect()
    }

    pub fn summary_on(&self, date: NaiveDate) -> Result<Summary> {
        Ok(Summary {
            date,
            day: self.sum_for_period_on(Period::Day, date)?,
            month: self.sum_for_period_on(Period::Month, date)?,
            year: self.sum_for_period_on(Period::Year, date)?,
            total: self.sum_for_category(&CategorySelector::All)?,
            budgets: self.budget_report_on(date)?,
        })
    }

    // ========================================================================
    // Commits
    // ========================================================================

    pub fn commit_expenses(&self, buffer: &mut ChangeBuffer<Change>) -> Result<CommitReport> {
        CommitCoordinator::new(&self.categories).commit::<Expense, _>(&self.expenses, buffer)
    }

    pub fn commit_budgets(&self, buffer: &mut ChangeBuffer<Change>) -> Result<CommitReport> {
        CommitCoordinator::new(&self.categories).commit::<Budget, _>(&self.budgets, buffer)
    }

    pub fn commit_categories(&self, buffer: &mut ChangeBuffer<TreeChange>) -> Result<CommitReport> {
        let report = CommitCoordinator::new(&self.categories).commit_tree(buffer)?;
        if report.deleted > 0 {
            let expenses = self.expenses.compact()?;
            let budgets = self.budgets.compact()?;
            tracing::debug!(expenses, budgets, "compacted after category delete");
        }
        Ok(report)
    }

    /// Append imported rows as one batch; nothing is written if any row is invalid
    pub fn import_expenses(&self, records: &[ExpenseRecord]) -> Result<CommitReport> {
        let first_row = self.expenses.count()? as i64 + 1;
        let mut buffer = ChangeBuffer::new();
        for (offset, record) in records.iter().enumerate() {
            for change in record.changes(first_row + offset as i64) {
                buffer.push(change);
            }
        }
        let report = self.commit_expenses(&mut buffer)?;
        tracing::info!(imported = report.added, "imported expenses");
        Ok(report)
    }

    fn find_category(&self, name: &str) -> Result<Category> {
        self.category_tree()?
            .find_by_name(name)
            .cloned()
            .ok_or_else(|| BookkeeperError::Reference {
                field: "Category".to_string(),
                value: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::NodeId;
    use crate::entities::{UNCATEGORIZED, UNCATEGORIZED_ID};
    use chrono::Datelike;
    use tempfile::TempDir;

    fn open_ledger(date_basis: DateBasis) -> (TempDir, Ledger) {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("book.db"), date_basis).unwrap();
        (dir, ledger)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add_category(ledger: &Ledger, name: &str, parent: Option<&str>) {
        let mut buffer = ChangeBuffer::new();
        buffer.push(TreeChange::Add {
            node: NodeId::new(),
            name: name.to_string(),
            parent: parent.map(str::to_string),
        });
        ledger.commit_categories(&mut buffer).unwrap();
    }

    #[test]
    fn test_expense_today_counts_in_every_period() {
        let (_dir, ledger) = open_ledger(DateBasis::Spent);
        ledger
            .expenses()
            .add(&mut Expense::new(50, UNCATEGORIZED_ID))
            .unwrap();

        for period in Period::ALL {
            assert_eq!(ledger.sum_for_period(period).unwrap(), 50);
        }

        let last_year = today().with_day(1).unwrap().with_year(today().year() - 1).unwrap();
        ledger
            .expenses()
            .add(&mut Expense::new(30, UNCATEGORIZED_ID).on(last_year))
            .unwrap();

        assert_eq!(ledger.sum_for_period(Period::Day).unwrap(), 50);
        assert_eq!(ledger.sum_for_period(Period::Month).unwrap(), 50);
        assert_eq!(ledger.sum_for_period(Period::Year).unwrap(), 50);
        assert_eq!(ledger.sum_for_category(&CategorySelector::All).unwrap(), 80);
    }

    #[test]
    fn test_period_sums_on_fixed_dates() {
        let (_dir, ledger) = open_ledger(DateBasis::Spent);
        for (amount, spent) in [(10, date(2024, 5, 17)), (20, date(2024, 5, 2)), (40, date(2024, 1, 9))] {
            ledger
                .expenses()
                .add(&mut Expense::new(amount, UNCATEGORIZED_ID).on(spent))
                .unwrap();
        }

        let on = date(2024, 5, 17);
        assert_eq!(ledger.sum_for_period_on(Period::Day, on).unwrap(), 10);
        assert_eq!(ledger.sum_for_period_on(Period::Month, on).unwrap(), 30);
        assert_eq!(ledger.sum_for_period_on(Period::Year, on).unwrap(), 70);
    }

    #[test]
    fn test_recorded_basis_uses_entry_date() {
        let (_dir, ledger) = open_ledger(DateBasis::Recorded);
        ledger
            .expenses()
            .add(&mut Expense::new(25, UNCATEGORIZED_ID).on(date(2001, 1, 1)))
            .unwrap();

        assert_eq!(ledger.sum_for_period(Period::Day).unwrap(), 25);
        assert_eq!(ledger.sum_for_period_on(Period::Year, date(2001, 6, 1)).unwrap(), 0);
    }

    #[test]
    fn test_category_sums() {
        let (_dir, ledger) = open_ledger(DateBasis::Spent);
        add_category(&ledger, "food", None);
        add_category(&ledger, "restaurants", Some("food"));
        add_category(&ledger, "car", None);

        let mut buffer = ChangeBuffer::new();
        for (row, (amount, category)) in [(10, "food"), (20, "restaurants"), (40, "car")]
            .into_iter()
            .enumerate()
        {
            buffer.push(Change::add("amount", amount.to_string()));
            buffer.push(Change::update(row as i64 + 1, "category", category));
        }
        ledger.commit_expenses(&mut buffer).unwrap();

        let named = |name: &str| CategorySelector::Named(name.to_string());
        assert_eq!(ledger.sum_for_category(&named("food")).unwrap(), 10);
        assert_eq!(ledger.sum_for_category_tree("food").unwrap(), 30);
        assert_eq!(ledger.sum_for_category(&CategorySelector::All).unwrap(), 70);
        assert!(matches!(
            ledger.sum_for_category(&named("travel")).unwrap_err(),
            BookkeeperError::Reference { .. }
        ));

        buffer.push(Change::update(3, "category", ""));
        ledger.commit_expenses(&mut buffer).unwrap();
        assert_eq!(ledger.sum_for_category(&named("car")).unwrap(), 0);
        assert_eq!(ledger.sum_for_category(&named(UNCATEGORIZED)).unwrap(), 40);
        assert_eq!(ledger.sum_for_category(&CategorySelector::All).unwrap(), 70);
    }

    #[test]
    fn test_category_delete_cascades_and_compacts() {
        let (_dir, ledger) = open_ledger(DateBasis::Spent);
        add_category(&ledger, "food", None);
        add_category(&ledger, "meat", Some("food"));
        add_category(&ledger, "car", None);

        ledger.expenses().add(&mut Expense::new(10, 3)).unwrap();
        ledger.expenses().add(&mut Expense::new(20, 4)).unwrap();
        ledger.budgets().add(&mut Budget::new(100, 2, Period::Month)).unwrap();
        ledger.budgets().add(&mut Budget::new(200, 4, Period::Year)).unwrap();

        let mut buffer = ChangeBuffer::new();
        buffer.push(TreeChange::Delete {
            node: NodeId::new(),
            name: "food".to_string(),
        });
        let report = ledger.commit_categories(&mut buffer).unwrap();
        assert_eq!(report.deleted, 1);

        let expenses = ledger.expenses().get_all(None).unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!((expenses[0].pk, expenses[0].amount, expenses[0].category), (1, 20, 2));

        let budgets = ledger.budgets().get_all(None).unwrap();
        assert_eq!(budgets.len(), 1);
        assert_eq!((budgets[0].pk, budgets[0].category), (1, 2));
        assert_eq!(ledger.category_tree().unwrap().find_by_name("car").unwrap().pk, 2);
    }

    #[test]
    fn test_budget_report() {
        let (_dir, ledger) = open_ledger(DateBasis::Spent);
        ledger
            .budgets()
            .add(&mut Budget::new(1000, UNCATEGORIZED_ID, Period::Month))
            .unwrap();
        ledger
            .expenses()
            .add(&mut Expense::new(300, UNCATEGORIZED_ID).on(date(2024, 5, 3)))
            .unwrap();

        let report = ledger.budget_report_on(date(2024, 5, 17)).unwrap();
        let month = report.iter().find(|l| l.period == Period::Month).unwrap();
        assert_eq!((month.budgeted, month.spent, month.remaining), (1000, 300, 700));

        let day = report.iter().find(|l| l.period == Period::Day).unwrap();
        assert_eq!((day.budgeted, day.spent, day.remaining), (0, 0, 0));
    }

    #[test]
    fn test_import_is_all_or_nothing() {
        let (_dir, ledger) = open_ledger(DateBasis::Spent);
        add_category(&ledger, "food", None);

        let good = ExpenseRecord {
            amount: "1250".to_string(),
            category: Some("food".to_string()),
            date: Some("2024-05-17".to_string()),
            comment: None,
        };
        let bad = ExpenseRecord {
            date: Some("17/05/2024".to_string()),
            ..good.clone()
        };

        let err = ledger.import_expenses(&[good.clone(), bad]).unwrap_err();
        assert!(matches!(err, BookkeeperError::Format { .. }));
        assert_eq!(ledger.expenses().count().unwrap(), 0);

        let report = ledger.import_expenses(&[good.clone(), good]).unwrap();
        assert_eq!(report.added, 2);
        let expenses = ledger.expenses().get_all(None).unwrap();
        assert!(expenses.iter().all(|e| e.category == 2 && e.amount == 1250));
        assert_eq!(expenses[1].expense_date, Some(date(2024, 5, 17)));
    }

    #[test]
    fn test_summary_serializes() {
        let (_dir, ledger) = open_ledger(DateBasis::Spent);
        let summary = ledger.summary_on(date(2024, 5, 17)).unwrap();
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["date"], "2024-05-17");
        assert_eq!(json["total"], 0);
        assert_eq!(json["budgets"].as_array().unwrap().len(), 3);
        assert_eq!(json["budgets"][1]["period"], "month");
    }
}
