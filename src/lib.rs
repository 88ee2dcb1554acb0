// Bookkeeper - Core Library
// Repositories, change buffers and the commit coordinator behind the expense views and the CLI

pub mod changes;   // Pending edits (grid + tree) with coalescing
pub mod commit;    // Two-phase validate/apply of a change buffer
pub mod db;        // Store handle, schema setup, aggregate queries
pub mod entities;  // Expense, Category (+ tree), Budget
pub mod error;
pub mod fields;    // Declared columns, values, coercion
pub mod import;    // CSV expense import
pub mod ledger;    // Facade used by the CLI
pub mod repository;
pub mod settings;

// Re-export commonly used types
pub use changes::{Change, ChangeBuffer, Coalesce, NodeId, TreeChange};
pub use commit::{CommitCoordinator, CommitReport, GridPlan, TreePlan};
pub use db::{setup_database, Store};
pub use entities::{
    Budget, Category, CategoryTree, Entity, Expense, OutlineEntry, Period, UNCATEGORIZED,
    UNCATEGORIZED_ID,
};
pub use error::{BookkeeperError, Result};
pub use fields::{Field, FieldKind, FieldValue};
pub use import::{load_csv, ExpenseRecord};
pub use ledger::{BudgetLine, CategorySelector, Ledger, Summary};
pub use repository::{Filter, MemoryRepository, Repository, SqliteRepository, TableSchema};
pub use settings::{DateBasis, Settings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
