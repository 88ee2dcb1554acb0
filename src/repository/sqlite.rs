//! Repository backed by the SQLite store.
//!
//! Column names, SQL statements and DDL come from the entity's declared
//! fields, once, when the repository is built. Keys follow row order: `get(id)`
//! reads the row at position `id`, and every delete renumbers the survivors
//! (and the self-reference column, if any) so positions and keys agree.

use super::{cascade_victims, Filter, Repository};
use crate::db::Store;
use crate::entities::Entity;
use crate::error::{BookkeeperError, Result};
use crate::fields::{Field, FieldValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::marker::PhantomData;

// ============================================================================
// TABLE SCHEMA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub fields: &'static [Field],
}

impl TableSchema {
    pub fn of<T: Entity>() -> Self {
        TableSchema {
            table: T::table_name(),
            fields: T::fields(),
        }
    }

    fn column_list(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self.fields.iter().map(Field::column_sql).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY, {})",
            self.table,
            columns.join(", ")
        )
    }

    pub fn insert_sql(&self) -> String {
        let placeholders: Vec<String> = (1..=self.fields.len()).map(|i| format!("?{}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.column_list(),
            placeholders.join(", ")
        )
    }

    pub fn select_sql(&self) -> String {
        format!("SELECT id, {} FROM {}", self.column_list(), self.table)
    }

    pub fn update_sql(&self) -> String {
        let assignments: Vec<String> = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{} = ?{}", f.name, i + 1))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            self.table,
            assignments.join(", "),
            self.fields.len() + 1
        )
    }

    /// Declared field called `name`
    pub fn column(&self, name: &str) -> Result<&'static Field> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| BookkeeperError::UnknownField {
                table: self.table.clone(),
                column: name.to_string(),
            })
    }
}

// ============================================================================
// SQLITE REPOSITORY
// ============================================================================

#[derive(Debug, Clone)]
pub struct SqliteRepository<T: Entity> {
    store: Store,
    schema: TableSchema,
    insert_sql: String,
    select_sql: String,
    update_sql: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> SqliteRepository<T> {
    pub fn new(store: Store) -> Self {
        let schema = TableSchema::of::<T>();
        SqliteRepository {
            store,
            insert_sql: schema.insert_sql(),
            select_sql: schema.select_sql(),
            update_sql: schema.update_sql(),
            schema,
            _entity: PhantomData,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn read_row(&self, row: &Row<'_>) -> rusqlite::Result<(i64, Vec<FieldValue>)> {
        let pk: i64 = row.get(0)?;
        let values = (1..=self.schema.fields.len())
            .map(|i| row.get::<_, FieldValue>(i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((pk, values))
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<T>> {
        let conn = self.store.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| self.read_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(pk, values)| T::from_values(pk, values))
            .collect()
    }

    /// Renumber rows so keys are `1..=N` again, e.g. after a store cascade
    /// removed rows behind the repository's back. Returns how many keys moved.
    pub fn compact(&self) -> Result<usize> {
        let mut conn = self.store.connect()?;
        let tx = conn.transaction()?;
        let moved = close_gaps(&tx, &self.schema.table, T::self_reference())?;
        tx.commit()?;
        if moved > 0 {
            tracing::debug!(table = %self.schema.table, moved, "compacted keys");
        }
        Ok(moved)
    }
}

/// Shift keys down so they are exactly `1..=N` in their current order.
///
/// Rows are processed in ascending key order. Each new key is at most the old
/// one and above every key already assigned, so no update collides. When
/// `self_ref` is set, references to each moved key follow it; if the store
/// already cascaded the change, that second update matches nothing.
fn close_gaps(conn: &Connection, table: &str, self_ref: Option<&str>) -> Result<usize> {
    let mut stmt = conn.prepare(&format!("SELECT id FROM {} ORDER BY id", table))?;
    let keys = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;

    let move_key = format!("UPDATE {} SET id = ?1 WHERE id = ?2", table);
    let move_ref = self_ref.map(|column| {
        format!("UPDATE {} SET {} = ?1 WHERE {} = ?2", table, column, column)
    });

    let mut moved = 0;
    for (position, old) in keys.into_iter().enumerate() {
        let new = position as i64 + 1;
        if new == old {
            continue;
        }
        conn.execute(&move_key, params![new, old])?;
        if let Some(sql) = &move_ref {
            conn.execute(sql, params![new, old])?;
        }
        moved += 1;
    }
    Ok(moved)
}

impl<T: Entity> Repository<T> for SqliteRepository<T> {
    fn add(&self, obj: &mut T) -> Result<i64> {
        if obj.pk() != 0 {
            return Err(BookkeeperError::InvalidState(format!(
                "trying to add {} with filled pk {}",
                self.schema.table,
                obj.pk()
            )));
        }
        let mut conn = self.store.connect()?;
        let tx = conn.transaction()?;
        tx.execute(&self.insert_sql, params_from_iter(obj.to_values()))?;
        let pk = tx.last_insert_rowid();
        tx.commit()?;
        obj.set_pk(pk);
        Ok(pk)
    }

    fn get(&self, id: i64) -> Result<T> {
        if id < 1 {
            return Err(BookkeeperError::not_found(&self.schema.table, id));
        }
        let conn = self.store.connect()?;
        let sql = format!("{} ORDER BY id LIMIT 1 OFFSET ?1", self.select_sql);
        let found = conn
            .query_row(&sql, params![id - 1], |row| self.read_row(row))
            .optional()?;
        match found {
            Some((_, values)) => T::from_values(id, values),
            None => Err(BookkeeperError::not_found(&self.schema.table, id)),
        }
    }

    fn get_all(&self, filter: Option<&Filter>) -> Result<Vec<T>> {
        match filter {
            None => self.query(&format!("{} ORDER BY id", self.select_sql), &[]),
            Some(filter) => {
                let field = self.schema.column(&filter.field)?;
                if filter.value.is_null() {
                    let sql = format!("{} WHERE {} IS NULL ORDER BY id", self.select_sql, field.name);
                    self.query(&sql, &[])
                } else {
                    let sql = format!("{} WHERE {} = ?1 ORDER BY id", self.select_sql, field.name);
                    self.query(&sql, &[&filter.value])
                }
            }
        }
    }

    fn update(&self, obj: &T) -> Result<()> {
        if obj.pk() == 0 {
            return Err(BookkeeperError::InvalidState(format!(
                "attempt to update {} with unknown primary key",
                self.schema.table
            )));
        }
        let mut values = obj.to_values();
        values.push(FieldValue::Integer(obj.pk()));

        let mut conn = self.store.connect()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(&self.update_sql, params_from_iter(values))?;
        if changed == 0 {
            return Err(BookkeeperError::not_found(&self.schema.table, obj.pk()));
        }
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<()> {
        let table = &self.schema.table;
        let self_ref = T::self_reference();

        let mut conn = self.store.connect()?;
        let tx = conn.transaction()?;

        let link_sql = match self_ref {
            Some(column) => format!("SELECT id, {} FROM {} ORDER BY id", column, table),
            None => format!("SELECT id, NULL FROM {} ORDER BY id", table),
        };
        let links = {
            let mut stmt = tx.prepare(&link_sql)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        if !links.iter().any(|(pk, _)| *pk == id) {
            return Err(BookkeeperError::not_found(table, id));
        }

        let victims = cascade_victims(&links, id);
        let placeholders = vec!["?"; victims.len()].join(", ");
        tx.execute(
            &format!("DELETE FROM {} WHERE id IN ({})", table, placeholders),
            params_from_iter(victims.iter()),
        )?;
        let moved = close_gaps(&tx, table, self_ref)?;
        tx.commit()?;

        tracing::debug!(%table, id, removed = victims.len(), moved, "deleted");
        Ok(())
    }

    fn add_empty(&self) -> Result<i64> {
        let mut conn = self.store.connect()?;
        let tx = conn.transaction()?;
        tx.execute(&self.insert_sql, params_from_iter(T::blank_values()))?;
        let pk = tx.last_insert_rowid();
        tx.commit()?;
        Ok(pk)
    }

    fn update_field(&self, id: i64, field: &str, value: FieldValue) -> Result<()> {
        let column = self.schema.column(field)?;
        let sql = format!("UPDATE {} SET {} = ?1 WHERE id = ?2", self.schema.table, column.name);

        let mut conn = self.store.connect()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(&sql, params![value, id])?;
        if changed == 0 {
            return Err(BookkeeperError::not_found(&self.schema.table, id));
        }
        tx.commit()?;
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        let conn = self.store.connect()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.schema.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
