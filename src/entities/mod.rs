// Entity Models
//
// Each entity has:
// - A `pk` that is 0 until a repository assigns it, then equals the row's position
// - An ordered list of declared fields (the pk column is implicit)
// - Conversions to and from one value per declared field

pub mod budget;
pub mod category;
pub mod expense;

pub use budget::{Budget, Period};
pub use category::{Category, CategoryTree, OutlineEntry, UNCATEGORIZED, UNCATEGORIZED_ID};
pub use expense::Expense;

use crate::error::Result;
use crate::fields::{Field, FieldValue};

/// A record a repository can store.
pub trait Entity: Clone + std::fmt::Debug {
    /// Declared columns, in the order `to_values`/`from_values` use.
    fn fields() -> &'static [Field];

    /// Table name, derived from the type name (`Expense` -> `expense`).
    fn table_name() -> String {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full).to_lowercase()
    }

    fn pk(&self) -> i64;

    fn set_pk(&mut self, pk: i64);

    fn to_values(&self) -> Vec<FieldValue>;

    /// Rebuild an entity from one value per declared field.
    fn from_values(pk: i64, values: Vec<FieldValue>) -> Result<Self>;

    /// Values written by `add_empty`.
    fn blank_values() -> Vec<FieldValue>;

    /// Field that points at another row of the same table, if any.
    ///
    /// Repositories renumber it together with the keys and follow it for
    /// cascading deletes.
    fn self_reference() -> Option<&'static str> {
        None
    }

    fn field_index(name: &str) -> Option<usize> {
        Self::fields().iter().position(|f| f.name == name)
    }

    fn field(name: &str) -> Option<&'static Field> {
        Self::fields().iter().find(|f| f.name == name)
    }

    fn value_of(&self, name: &str) -> Option<FieldValue> {
        let index = Self::field_index(name)?;
        self.to_values().into_iter().nth(index)
    }
}

/// Take the next value of a row, `Null` when the row is short.
pub(crate) fn next_value(values: &mut std::vec::IntoIter<FieldValue>) -> FieldValue {
    values.next().unwrap_or(FieldValue::Null)
}
