//! Errors raised by the repositories and the commit coordinator.
//!
//! Validation errors ([`Reference`], [`Format`], [`Type`], [`DuplicateName`],
//! [`Cycle`], [`EmptyName`], [`ProtectedCategory`]) are produced before a batch
//! touches the store and carry enough context for a single user-facing message.
//! [`InvalidState`] is a caller bug. [`Store`] wraps anything the database
//! itself rejected.
//!
//!  [`Reference`]: BookkeeperError::Reference
//!  [`Format`]: BookkeeperError::Format
//!  [`Type`]: BookkeeperError::Type
//!  [`DuplicateName`]: BookkeeperError::DuplicateName
//!  [`Cycle`]: BookkeeperError::Cycle
//!  [`EmptyName`]: BookkeeperError::EmptyName
//!  [`ProtectedCategory`]: BookkeeperError::ProtectedCategory
//!  [`InvalidState`]: BookkeeperError::InvalidState
//!  [`Store`]: BookkeeperError::Store
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookkeeperError {
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("{entity} #{id} not found")]
    NotFound { entity: String, id: i64 },
    #[error("{field} {value:?} not found")]
    Reference { field: String, value: String },
    #[error("Date format illegal in {location}: {value:?} (expected YYYY-MM-DD)")]
    Format { location: String, value: String },
    #[error("Illegal value in {location}: {value:?} is not a valid {expected}")]
    Type {
        location: String,
        value: String,
        expected: String,
    },
    #[error("Category {0:?} already exists")]
    DuplicateName(String),
    #[error("Category {name:?} cannot be moved under {parent:?}: it is one of its descendants")]
    Cycle { name: String, parent: String },
    #[error("Category name must not be empty")]
    EmptyName,
    /// The Uncategorized seed stays a root and is never deleted
    #[error("Category {0:?} cannot be deleted or moved")]
    ProtectedCategory(String),
    #[error("Unknown column {column:?} in table {table}")]
    UnknownField { table: String, column: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

impl BookkeeperError {
    pub fn not_found(entity: &str, id: i64) -> Self {
        BookkeeperError::NotFound {
            entity: entity.to_string(),
            id,
        }
    }

    /// True for errors the user can fix by editing the pending batch.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            BookkeeperError::NotFound { .. }
                | BookkeeperError::Reference { .. }
                | BookkeeperError::Format { .. }
                | BookkeeperError::Type { .. }
                | BookkeeperError::DuplicateName(_)
                | BookkeeperError::Cycle { .. }
                | BookkeeperError::EmptyName
                | BookkeeperError::ProtectedCategory(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BookkeeperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_cell() {
        let err = BookkeeperError::Type {
            location: "row 3, column amount".to_string(),
            value: "abc".to_string(),
            expected: "integer".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Illegal value in row 3, column amount: \"abc\" is not a valid integer"
        );

        let err = BookkeeperError::Reference {
            field: "Category".to_string(),
            value: "Travel".to_string(),
        };
        assert_eq!(err.to_string(), "Category \"Travel\" not found");
    }

    #[test]
    fn test_user_errors_are_separated_from_contract_errors() {
        assert!(BookkeeperError::DuplicateName("food".to_string()).is_user_error());
        assert!(BookkeeperError::not_found("expense", 4).is_user_error());
        assert!(BookkeeperError::ProtectedCategory("Uncategorized".to_string()).is_user_error());
        assert!(!BookkeeperError::InvalidState("pk".to_string()).is_user_error());
        assert!(!BookkeeperError::Store(rusqlite::Error::QueryReturnedNoRows).is_user_error());
    }
}
