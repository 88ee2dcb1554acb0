//! Typed repositories.
//!
//! A repository stores entities of one type and assigns each a `pk`. Keys are
//! dense: with N rows in use they are exactly `1..=N`, ordered like the rows.
//! Deleting a row closes the gap by shifting every later key (and every
//! self-reference to a shifted key) down, so a 1-based grid row number always
//! addresses the same entity as the store key.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryRepository;
pub use sqlite::{SqliteRepository, TableSchema};

use crate::entities::Entity;
use crate::error::Result;
use crate::fields::FieldValue;
use std::collections::{BTreeSet, HashMap};

/// Single-field condition for [`Repository::get_all`].
///
/// A `Null` value matches rows where the field IS NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: FieldValue,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Filter {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Filter {
            field: field.into(),
            value: FieldValue::Null,
        }
    }
}

pub trait Repository<T: Entity> {
    /// Store a new entity. `obj.pk` must be 0; it is set to the assigned key.
    fn add(&self, obj: &mut T) -> Result<i64>;

    /// Entity at position `id` (1-based) in key order.
    fn get(&self, id: i64) -> Result<T>;

    /// All entities in key order, optionally restricted by one field.
    fn get_all(&self, filter: Option<&Filter>) -> Result<Vec<T>>;

    /// Overwrite every declared field of the row addressed by `obj.pk`.
    fn update(&self, obj: &T) -> Result<()>;

    /// Remove a row (and, for self-referencing entities, its whole subtree),
    /// then renumber the survivors.
    fn delete(&self, id: i64) -> Result<()>;

    /// Append a row of blank values and return its key.
    fn add_empty(&self) -> Result<i64>;

    /// Set one column of one row.
    fn update_field(&self, id: i64, field: &str, value: FieldValue) -> Result<()>;

    fn count(&self) -> Result<usize> {
        Ok(self.get_all(None)?.len())
    }
}

/// Keys removed when `root` is deleted: `root` plus every key whose chain of
/// parents reaches it.
///
/// `rows` pairs each key with its self-reference value.
pub(crate) fn cascade_victims(rows: &[(i64, Option<i64>)], root: i64) -> BTreeSet<i64> {
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for (pk, parent) in rows {
        if let Some(parent) = parent {
            children.entry(*parent).or_default().push(*pk);
        }
    }

    let mut victims = BTreeSet::from([root]);
    let mut pending = vec![root];
    while let Some(pk) = pending.pop() {
        for child in children.get(&pk).into_iter().flatten() {
            if victims.insert(*child) {
                pending.push(*child);
            }
        }
    }
    victims
}

/// New key for every surviving key after `victims` are removed:
/// `k - |{v in victims : v < k}|`.
pub(crate) fn renumbering(survivors: &[i64], victims: &BTreeSet<i64>) -> Vec<(i64, i64)> {
    survivors
        .iter()
        .map(|&old| (old, old - victims.range(..old).count() as i64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_victims_follow_parent_chain() {
        let rows = [
            (1, None),
            (2, None),
            (3, Some(2)),
            (4, Some(3)),
            (5, None),
            (6, Some(4)),
        ];
        assert_eq!(
            cascade_victims(&rows, 2),
            BTreeSet::from([2, 3, 4, 6])
        );
        assert_eq!(cascade_victims(&rows, 5), BTreeSet::from([5]));
    }

    #[test]
    fn test_cascade_victims_terminate_on_cycles() {
        let rows = [(1, Some(2)), (2, Some(1))];
        assert_eq!(cascade_victims(&rows, 1), BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_renumbering_closes_gaps() {
        let victims = BTreeSet::from([2, 3, 6]);
        let survivors = [1, 4, 5, 7];
        assert_eq!(
            renumbering(&survivors, &victims),
            vec![(1, 1), (4, 2), (5, 3), (7, 4)]
        );
    }

    #[test]
    fn test_filter_constructors() {
        assert_eq!(Filter::is_null("parent").value, FieldValue::Null);
        assert_eq!(Filter::eq("parent", 3_i64).value, FieldValue::Integer(3));
    }
}
