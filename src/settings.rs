//! Runtime settings.
//!
//! Defaults, then an optional TOML file (`bookkeeper.toml` unless another path
//! is given), then `BOOKKEEPER_*` environment variables, e.g.
//! `BOOKKEEPER_DATABASE__PATH=/tmp/book.db`.
use config::{Config, ConfigError, Environment, File, Map};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_SETTINGS_FILE: &str = "bookkeeper.toml";

/// Which expense date the period sums match against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateBasis {
    /// The day the money was spent (`expense_date`)
    #[default]
    Spent,
    /// The day the record was entered (`date`)
    Recorded,
}

impl DateBasis {
    pub fn column(&self) -> &'static str {
        match self {
            DateBasis::Spent => "expense_date",
            DateBasis::Recorded => "date",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Summary {
    pub date_basis: DateBasis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: Database,
    pub log: Log,
    pub summary: Summary,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::build(path.as_ref(), None)
    }

    /// `env` replaces the process environment when given
    fn build(path: &Path, env: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let environment = Environment::with_prefix("BOOKKEEPER")
            .prefix_separator("_")
            .separator("__")
            .source(env);

        let settings = Config::builder()
            .set_default("database.path", "book.db")?
            .set_default("log.level", "info")?
            .set_default("summary.date_basis", "spent")?
            .add_source(File::from(path).required(false))
            .add_source(environment)
            .build()?;

        settings.try_deserialize()
    }
}
