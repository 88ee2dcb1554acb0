//! Repository kept in process memory.
//!
//! Same dense, positional and cascading semantics as the SQLite repository.
//! Interior mutability through a `RefCell`: the whole model is single-threaded.

use super::{cascade_victims, renumbering, Filter, Repository};
use crate::entities::Entity;
use crate::error::{BookkeeperError, Result};
use crate::fields::FieldValue;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug)]
pub struct MemoryRepository<T: Entity> {
    rows: RefCell<Vec<T>>,
}

impl<T: Entity> MemoryRepository<T> {
    pub fn new() -> Self {
        MemoryRepository {
            rows: RefCell::new(Vec::new()),
        }
    }

    fn index_of(&self, id: i64) -> Result<usize> {
        let len = self.rows.borrow().len() as i64;
        if id < 1 || id > len {
            return Err(BookkeeperError::not_found(&T::table_name(), id));
        }
        Ok((id - 1) as usize)
    }

    fn check_field(name: &str) -> Result<usize> {
        T::field_index(name).ok_or_else(|| BookkeeperError::UnknownField {
            table: T::table_name(),
            column: name.to_string(),
        })
    }
}

impl<T: Entity> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Rebuild `entity` with field `index` replaced.
fn with_value<T: Entity>(entity: &T, index: usize, value: FieldValue) -> Result<T> {
    let mut values = entity.to_values();
    values[index] = value;
    T::from_values(entity.pk(), values)
}

impl<T: Entity> Repository<T> for MemoryRepository<T> {
    fn add(&self, obj: &mut T) -> Result<i64> {
        if obj.pk() != 0 {
            return Err(BookkeeperError::InvalidState(format!(
                "trying to add {} with filled pk {}",
                T::table_name(),
                obj.pk()
            )));
        }
        let mut rows = self.rows.borrow_mut();
        let pk = rows.len() as i64 + 1;
        obj.set_pk(pk);
        rows.push(obj.clone());
        Ok(pk)
    }

    fn get(&self, id: i64) -> Result<T> {
        let index = self.index_of(id)?;
        Ok(self.rows.borrow()[index].clone())
    }

    fn get_all(&self, filter: Option<&Filter>) -> Result<Vec<T>> {
        let rows = self.rows.borrow();
        let Some(filter) = filter else {
            return Ok(rows.clone());
        };
        let index = Self::check_field(&filter.field)?;
        Ok(rows
            .iter()
            .filter(|row| row.to_values().get(index) == Some(&filter.value))
            .cloned()
            .collect())
    }

    fn update(&self, obj: &T) -> Result<()> {
        if obj.pk() == 0 {
            return Err(BookkeeperError::InvalidState(format!(
                "attempt to update {} with unknown primary key",
                T::table_name()
            )));
        }
        let index = self.index_of(obj.pk())?;
        self.rows.borrow_mut()[index] = obj.clone();
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<()> {
        self.index_of(id)?;
        let self_ref = T::self_reference().and_then(T::field_index);

        let mut rows = self.rows.borrow_mut();
        let victims = match self_ref {
            Some(index) => {
                let links: Vec<(i64, Option<i64>)> = rows
                    .iter()
                    .map(|row| (row.pk(), row.to_values()[index].as_i64()))
                    .collect();
                cascade_victims(&links, id)
            }
            None => BTreeSet::from([id]),
        };

        rows.retain(|row| !victims.contains(&row.pk()));
        let survivors: Vec<i64> = rows.iter().map(|row| row.pk()).collect();
        let new_keys: HashMap<i64, i64> = renumbering(&survivors, &victims).into_iter().collect();

        for row in rows.iter_mut() {
            let new_pk = new_keys[&row.pk()];
            row.set_pk(new_pk);
            if let Some(index) = self_ref {
                let target = row.to_values()[index].as_i64();
                if let Some(new_target) = target.and_then(|t| new_keys.get(&t)) {
                    let renumbered = with_value(row, index, FieldValue::Integer(*new_target))?;
                    *row = renumbered;
                }
            }
        }
        Ok(())
    }

    fn add_empty(&self) -> Result<i64> {
        let mut rows = self.rows.borrow_mut();
        let pk = rows.len() as i64 + 1;
        rows.push(T::from_values(pk, T::blank_values())?);
        Ok(pk)
    }

    fn update_field(&self, id: i64, field: &str, value: FieldValue) -> Result<()> {
        let field_index = Self::check_field(field)?;
        let index = self.index_of(id)?;
        let mut rows = self.rows.borrow_mut();
        let updated = with_value(&rows[index], field_index, value)?;
        rows[index] = updated;
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.rows.borrow().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Category, Expense};

    #[test]
    fn test_add_assigns_dense_keys() {
        let repo = MemoryRepository::new();
        for i in 1..=4 {
            let mut expense = Expense::new(i * 10, 1);
            assert_eq!(repo.add(&mut expense).unwrap(), i);
            assert_eq!(expense.pk, i);
            assert_eq!(repo.get(i).unwrap(), expense);
        }
    }

    #[test]
    fn test_add_with_filled_pk_is_rejected() {
        let repo = MemoryRepository::new();
        let mut expense = Expense::new(10, 1);
        expense.pk = 5;
        let err = repo.add(&mut expense).unwrap_err();
        assert!(matches!(err, BookkeeperError::InvalidState(_)));
    }

    #[test]
    fn test_update_without_pk_is_rejected() {
        let repo: MemoryRepository<Expense> = MemoryRepository::new();
        let err = repo.update(&Expense::new(10, 1)).unwrap_err();
        assert!(matches!(err, BookkeeperError::InvalidState(_)));
    }

    #[test]
    fn test_delete_renumbers_survivors() {
        let repo = MemoryRepository::new();
        for amount in [10, 20, 30, 40] {
            repo.add(&mut Expense::new(amount, 1)).unwrap();
        }

        repo.delete(2).unwrap();

        let all = repo.get_all(None).unwrap();
        let keys: Vec<i64> = all.iter().map(|e| e.pk).collect();
        let amounts: Vec<i64> = all.iter().map(|e| e.amount).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert_eq!(amounts, vec![10, 30, 40]);
    }

    #[test]
    fn test_delete_missing_row_is_not_found() {
        let repo: MemoryRepository<Expense> = MemoryRepository::new();
        assert!(matches!(
            repo.delete(1).unwrap_err(),
            BookkeeperError::NotFound { .. }
        ));
    }

    #[test]
    fn test_delete_category_cascades_and_rewrites_parents() {
        let repo = MemoryRepository::new();
        repo.add(&mut Category::new("Uncategorized", None)).unwrap();
        repo.add(&mut Category::new("food", None)).unwrap();
        repo.add(&mut Category::new("meat", Some(2))).unwrap();
        repo.add(&mut Category::new("car", None)).unwrap();
        repo.add(&mut Category::new("fuel", Some(4))).unwrap();

        repo.delete(2).unwrap();

        let all = repo.get_all(None).unwrap();
        let rows: Vec<(i64, &str, Option<i64>)> = all
            .iter()
            .map(|c| (c.pk, c.name.as_str(), c.parent))
            .collect();
        assert_eq!(
            rows,
            vec![(1, "Uncategorized", None), (2, "car", None), (3, "fuel", Some(2))]
        );
    }

    #[test]
    fn test_filters() {
        let repo = MemoryRepository::new();
        repo.add(&mut Category::new("food", None)).unwrap();
        repo.add(&mut Category::new("meat", Some(1))).unwrap();
        repo.add(&mut Category::new("fish", Some(1))).unwrap();

        assert_eq!(repo.get_all(Some(&Filter::is_null("parent"))).unwrap().len(), 1);
        assert_eq!(repo.get_all(Some(&Filter::eq("parent", 1_i64))).unwrap().len(), 2);
        assert_eq!(repo.get_all(Some(&Filter::eq("name", "fish"))).unwrap()[0].pk, 3);
        assert!(matches!(
            repo.get_all(Some(&Filter::eq("colour", "red"))).unwrap_err(),
            BookkeeperError::UnknownField { .. }
        ));
    }

    #[test]
    fn test_add_empty_then_update_field() {
        let repo: MemoryRepository<Expense> = MemoryRepository::new();
        let id = repo.add_empty().unwrap();
        repo.update_field(id, "amount", FieldValue::Integer(75)).unwrap();
        repo.update_field(id, "comment", FieldValue::from("taxi")).unwrap();

        let expense = repo.get(id).unwrap();
        assert_eq!(expense.amount, 75);
        assert_eq!(expense.comment, "taxi");
        assert_eq!(expense.category, 1);
    }
}
