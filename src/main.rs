use anyhow::{Context, Result};
use bookkeeper::fields::today;
use bookkeeper::{
    load_csv, Change, ChangeBuffer, CommitReport, Ledger, NodeId, Repository, Settings, TreeChange,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bookkeeper")]
#[command(about = "Personal expense ledger: categories, expenses and budgets in one SQLite file")]
#[command(version = bookkeeper::VERSION)]
struct Cli {
    /// Settings file (TOML); missing file means defaults
    #[arg(long, env = "BOOKKEEPER_CONFIG", default_value = bookkeeper::settings::DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    /// Database file, overrides the settings file
    #[arg(long)]
    database: Option<String>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database (tables + Uncategorized)
    Init,
    /// Import expenses from a CSV file (amount,category,date,comment)
    Import { csv: PathBuf },
    /// Spending for today, this month and this year, against budgets
    Summary,
    /// Category tree
    Categories,
    /// All expenses
    Expenses,
    AddCategory {
        name: String,
        #[arg(long)]
        parent: Option<String>,
    },
    RenameCategory { old: String, new: String },
    /// Move a category under another one (no --parent makes it a root)
    MoveCategory {
        name: String,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Delete a category with all its subcategories and their expenses
    DeleteCategory { name: String },
    AddExpense {
        /// Amount in minor units (cents)
        #[arg(allow_hyphen_values = true)]
        amount: String,
        #[arg(long)]
        category: Option<String>,
        /// Day of the spend, YYYY-MM-DD (default today)
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Delete the expense shown on row ROW of `expenses`
    DeleteExpense { row: i64 },
    AddBudget {
        /// Amount in minor units (cents)
        amount: String,
        /// day, month or year
        #[arg(long, default_value = "month")]
        period: String,
        #[arg(long)]
        category: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;
    if let Some(database) = &cli.database {
        settings.database.path = database.clone();
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log.level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let ledger = Ledger::open(&settings.database.path, settings.summary.date_basis)
        .with_context(|| format!("Failed to open database {}", settings.database.path))?;

    match cli.command {
        Command::Init => {
            let categories = ledger.categories().count()?;
            println!("✓ Database ready at {}", settings.database.path);
            println!("✓ {} categories", categories);
        }
        Command::Import { csv } => {
            let records = load_csv(&csv)
                .with_context(|| format!("Failed to read {}", csv.display()))?;
            println!("📂 Loaded {} rows from {}", records.len(), csv.display());
            let report = ledger.import_expenses(&records).context("Import rejected")?;
            print_report(&report, cli.json)?;
        }
        Command::Summary => print_summary(&ledger, cli.json)?,
        Command::Categories => print_categories(&ledger, cli.json)?,
        Command::Expenses => print_expenses(&ledger, cli.json)?,
        Command::AddCategory { name, parent } => {
            commit_tree(&ledger, TreeChange::Add { node: NodeId::new(), name, parent }, cli.json)?
        }
        Command::RenameCategory { old, new } => commit_tree(
            &ledger,
            TreeChange::Rename {
                node: NodeId::new(),
                new_name: new,
                old_name: old,
            },
            cli.json,
        )?,
        Command::MoveCategory { name, parent } => commit_tree(
            &ledger,
            TreeChange::Move {
                node: NodeId::new(),
                name,
                new_parent: parent,
            },
            cli.json,
        )?,
        Command::DeleteCategory { name } => commit_tree(
            &ledger,
            TreeChange::Delete {
                node: NodeId::new(),
                name,
            },
            cli.json,
        )?,
        Command::AddExpense {
            amount,
            category,
            date,
            comment,
        } => {
            let row = ledger.expenses().count()? as i64 + 1;
            let spent = date.unwrap_or_else(|| bookkeeper::fields::format_date(today()));

            let mut buffer = ChangeBuffer::new();
            buffer.push(Change::add("amount", amount));
            buffer.push(Change::update(row, "expense_date", spent));
            if let Some(category) = category {
                buffer.push(Change::update(row, "category", category));
            }
            if let Some(comment) = comment {
                buffer.push(Change::update(row, "comment", comment));
            }
            let report = ledger
                .commit_expenses(&mut buffer)
                .context("Expense rejected")?;
            print_report(&report, cli.json)?;
        }
        Command::DeleteExpense { row } => {
            let mut buffer = ChangeBuffer::new();
            buffer.push(Change::delete(row));
            let report = ledger
                .commit_expenses(&mut buffer)
                .context("Delete rejected")?;
            print_report(&report, cli.json)?;
        }
        Command::AddBudget {
            amount,
            period,
            category,
        } => {
            let row = ledger.budgets().count()? as i64 + 1;
            let mut buffer = ChangeBuffer::new();
            buffer.push(Change::add("amount", amount));
            buffer.push(Change::update(row, "period", period));
            if let Some(category) = category {
                buffer.push(Change::update(row, "category", category));
            }
            let report = ledger
                .commit_budgets(&mut buffer)
                .context("Budget rejected")?;
            print_report(&report, cli.json)?;
        }
    }

    Ok(())
}

fn commit_tree(ledger: &Ledger, change: TreeChange, json: bool) -> Result<()> {
    let mut buffer = ChangeBuffer::new();
    buffer.push(change);
    let report = ledger
        .commit_categories(&mut buffer)
        .context("Category change rejected")?;
    print_report(&report, json)
}

// ============================================================================
// Output
// ============================================================================

/// Minor units as a decimal amount: -1250 → "-12.50"
fn format_amount(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

fn print_report(report: &CommitReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "✅ Committed: {} added, {} updated, {} deleted, {} cleared",
        report.added, report.updated, report.deleted, report.skipped
    );
    Ok(())
}

fn print_summary(ledger: &Ledger, json: bool) -> Result<()> {
    let summary = ledger.summary_on(today())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("📊 Spending as of {}", summary.date);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Today:      {:>12}", format_amount(summary.day));
    println!("  This month: {:>12}", format_amount(summary.month));
    println!("  This year:  {:>12}", format_amount(summary.year));
    println!("  All time:   {:>12}", format_amount(summary.total));

    let budgeted: Vec<_> = summary.budgets.iter().filter(|l| l.budgeted != 0).collect();
    if !budgeted.is_empty() {
        println!("\n💰 Budgets");
        for line in budgeted {
            let marker = if line.remaining < 0 { "⚠️ " } else { "✓" };
            println!(
                "  {} {:<6} budget {:>10}  spent {:>10}  left {:>10}",
                marker,
                line.period.as_str(),
                format_amount(line.budgeted),
                format_amount(line.spent),
                format_amount(line.remaining)
            );
        }
    }
    Ok(())
}

fn print_categories(ledger: &Ledger, json: bool) -> Result<()> {
    let outline = ledger.category_tree()?.outline();
    if json {
        println!("{}", serde_json::to_string_pretty(&outline)?);
        return Ok(());
    }
    for entry in outline {
        println!("{:>4}  {}{}", entry.pk, "  ".repeat(entry.depth), entry.name);
    }
    Ok(())
}

fn print_expenses(ledger: &Ledger, json: bool) -> Result<()> {
    let expenses = ledger.expenses().get_all(None)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&expenses)?);
        return Ok(());
    }

    let tree = ledger.category_tree()?;
    for expense in &expenses {
        let category = tree
            .get(expense.category)
            .map(|c| tree.path_string(c))
            .unwrap_or_default();
        let spent = expense
            .expense_date
            .map(|d| d.to_string())
            .unwrap_or_default();
        println!(
            "{:>4}  {:<10}  {:>12}  {:<30}  {}",
            expense.pk,
            spent,
            format_amount(expense.amount),
            category,
            expense.comment
        );
    }
    println!("\n✓ {} expenses", expenses.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1250), "12.50");
        assert_eq!(format_amount(-5), "-0.05");
        assert_eq!(format_amount(0), "0.00");
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from(["bookkeeper", "--json", "add-category", "meat", "--parent", "food"]);
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Command::AddCategory { ref name, parent: Some(ref parent) } if name == "meat" && parent == "food"
        ));

        let cli = Cli::parse_from(["bookkeeper", "add-expense", "-250", "--date", "2024-05-17"]);
        assert!(matches!(cli.command, Command::AddExpense { ref amount, .. } if amount == "-250"));
    }
}
