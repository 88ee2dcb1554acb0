use crate::entities::{Budget, Category, Entity, Expense, UNCATEGORIZED};
use crate::error::Result;
use crate::repository::TableSchema;
use rusqlite::{params, params_from_iter, Connection};
use std::path::{Path, PathBuf};

/// Handle on the single-file database.
///
/// Holds no open connection. Every operation calls [`Store::connect`], does its
/// work inside one transaction and drops the connection before returning, so
/// nothing stays open across calls or error paths.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Store { path: path.into() }
    }

    /// Open the store at `path`, creating tables and seed data if missing
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Store::new(path);
        let conn = store.connect()?;
        setup_database(&conn)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fresh connection with foreign keys enforced
    ///
    /// SQLite only honours ON DELETE/ON UPDATE CASCADE when the pragma is on,
    /// and it is per connection.
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Tables (derived from the entities' declared fields)
    // ==========================================================================
    for schema in [
        TableSchema::of::<Category>(),
        TableSchema::of::<Expense>(),
        TableSchema::of::<Budget>(),
    ] {
        conn.execute(&schema.create_sql(), [])?;
    }

    // ==========================================================================
    // Seed: every expense defaults to category 1
    // ==========================================================================
    let categories: i64 = conn.query_row("SELECT COUNT(*) FROM category", [], |row| row.get(0))?;
    if categories == 0 {
        conn.execute(
            "INSERT INTO category (name, parent) VALUES (?1, NULL)",
            params![UNCATEGORIZED],
        )?;
    }

    Ok(())
}

// ============================================================================
// Aggregates
// ============================================================================

/// Sum of expense amounts whose `date_column` matches a LIKE pattern
///
/// `date_column` must be a declared expense date column.
pub fn sum_amount_like(conn: &Connection, date_column: &str, pattern: &str) -> Result<i64> {
    debug_assert!(Expense::field(date_column).is_some());
    let sql = format!(
        "SELECT COALESCE(SUM(amount), 0) FROM expense WHERE {} LIKE ?1",
        date_column
    );
    let total: i64 = conn.query_row(&sql, params![pattern], |row| row.get(0))?;
    Ok(total)
}

/// Sum of every expense amount
pub fn sum_amount(conn: &Connection) -> Result<i64> {
    let total: i64 = conn.query_row("SELECT COALESCE(SUM(amount), 0) FROM expense", [], |row| {
        row.get(0)
    })?;
    Ok(total)
}

/// Sum of expense amounts filed under any of `categories`
pub fn sum_amount_for_categories(conn: &Connection, categories: &[i64]) -> Result<i64> {
    if categories.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; categories.len()].join(", ");
    let sql = format!(
        "SELECT COALESCE(SUM(amount), 0) FROM expense WHERE category IN ({})",
        placeholders
    );
    let total: i64 = conn.query_row(&sql, params_from_iter(categories.iter()), |row| row.get(0))?;
    Ok(total)
}

/// Sum of budget amounts declared for `period`
pub fn sum_budget(conn: &Connection, period: &str) -> Result<i64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM budget WHERE period = ?1",
        params![period],
        |row| row.get(0),
    )?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_expense(conn: &Connection, amount: i64, category: i64, expense_date: &str) {
        conn.execute(
            "INSERT INTO expense (amount, category, expense_date, date, comment)
             VALUES (?1, ?2, ?3, ?3, '')",
            params![amount, category, expense_date],
        )
        .unwrap();
    }

    #[test]
    fn test_setup_creates_tables_and_seed() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let name: String = conn
            .query_row("SELECT name FROM category WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, UNCATEGORIZED);

        for table in ["category", "expense", "budget"] {
            let exists: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "table {} should exist", table);
        }
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM category", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_sums() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn.execute("INSERT INTO category (name, parent) VALUES ('food', NULL)", [])
            .unwrap();

        insert_expense(&conn, 50, 1, "2024-05-17");
        insert_expense(&conn, 20, 2, "2024-05-01");
        insert_expense(&conn, 5, 2, "2023-05-17");

        assert_eq!(sum_amount(&conn).unwrap(), 75);
        assert_eq!(sum_amount_like(&conn, "expense_date", "2024-05-17").unwrap(), 50);
        assert_eq!(sum_amount_like(&conn, "expense_date", "2024-05-__").unwrap(), 70);
        assert_eq!(sum_amount_like(&conn, "date", "2024-__-__").unwrap(), 70);
        assert_eq!(sum_amount_for_categories(&conn, &[2]).unwrap(), 25);
        assert_eq!(sum_amount_for_categories(&conn, &[1, 2]).unwrap(), 75);
        assert_eq!(sum_amount_for_categories(&conn, &[]).unwrap(), 0);
    }

    #[test]
    fn test_sums_of_empty_tables_are_zero() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        assert_eq!(sum_amount(&conn).unwrap(), 0);
        assert_eq!(sum_amount_like(&conn, "date", "2024-__-__").unwrap(), 0);
        assert_eq!(sum_budget(&conn, "month").unwrap(), 0);
    }
}
