// ✅ Commit Coordinator - validate a whole batch, then apply it
//
// Phase 1 resolves every pending change into a plan without touching the
// store and stops at the first error. Phase 2 runs only when the whole batch
// passed and applies the plan in buffer order. The buffer is cleared only
// after a fully successful commit.

use crate::changes::{Change, ChangeBuffer, TreeChange};
use crate::entities::{Category, CategoryTree, Entity, UNCATEGORIZED, UNCATEGORIZED_ID};
use crate::error::{BookkeeperError, Result};
use crate::fields::{coerce, Field, FieldKind, FieldValue};
use crate::repository::{Filter, Repository};
use serde::Serialize;
use std::marker::PhantomData;

/// What a successful commit did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Cleared cells and no-op renames
    pub skipped: usize,
}

// ============================================================================
// PLANS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum GridStep {
    Add {
        field: Option<(&'static str, FieldValue)>,
    },
    Update {
        row: i64,
        field: &'static str,
        value: FieldValue,
        /// Written from an empty cell
        cleared: bool,
    },
    Delete {
        row: i64,
    },
}

/// Validated grid batch for entities of type `T`, ready to apply
#[derive(Debug, Clone, PartialEq)]
pub struct GridPlan<T> {
    steps: Vec<GridStep>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> GridPlan<T> {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TreeStep {
    Add { name: String, parent: Option<String> },
    Rename { from: String, to: String },
    Move { name: String, parent: Option<String> },
    Delete { name: String },
}

/// Validated tree batch, ready to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePlan {
    steps: Vec<TreeStep>,
    skipped: usize,
}

impl TreePlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn deletes(&self) -> bool {
        self.steps.iter().any(|s| matches!(s, TreeStep::Delete { .. }))
    }
}

// ============================================================================
// NAME FOREST (tree validation model)
// ============================================================================

#[derive(Debug, Clone)]
struct ForestNode {
    name: String,
    parent: Option<usize>,
    alive: bool,
}

/// The category forest as names and parent links, mutated by validation
/// exactly as the batch would mutate the store.
#[derive(Debug, Clone)]
struct NameForest {
    nodes: Vec<ForestNode>,
    /// Index of the Uncategorized seed row, if the store has one
    seed: Option<usize>,
}

impl NameForest {
    fn from_tree(tree: &CategoryTree) -> Self {
        let position = |pk: i64| tree.all().iter().position(|c| c.pk == pk);
        let nodes = tree
            .all()
            .iter()
            .map(|c| ForestNode {
                name: c.name.clone(),
                parent: c.parent.and_then(position),
                alive: true,
            })
            .collect();
        NameForest {
            nodes,
            seed: position(UNCATEGORIZED_ID),
        }
    }

    fn is_seed(&self, index: usize) -> bool {
        self.seed == Some(index)
    }

    /// First live node called `name`, in key order
    fn find(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.alive && n.name == name)
    }

    fn require(&self, name: &str, field: &str) -> Result<usize> {
        self.find(name).ok_or_else(|| BookkeeperError::Reference {
            field: field.to_string(),
            value: name.to_string(),
        })
    }

    fn check_free(&self, name: &str, except: Option<usize>) -> Result<()> {
        match self.find(name) {
            Some(existing) if Some(existing) != except => {
                Err(BookkeeperError::DuplicateName(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// True when `ancestor` is `node` or lies on its parent chain
    fn is_within(&self, node: usize, ancestor: usize) -> bool {
        let mut current = Some(node);
        for _ in 0..=self.nodes.len() {
            match current {
                Some(index) if index == ancestor => return true,
                Some(index) => current = self.nodes[index].parent,
                None => return false,
            }
        }
        false
    }

    fn remove_subtree(&mut self, root: usize) {
        let victims: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].alive && self.is_within(i, root))
            .collect();
        for index in victims {
            self.nodes[index].alive = false;
        }
    }
}

fn trimmed(name: Option<&str>) -> Option<String> {
    name.map(|n| n.trim().to_string())
}

fn valid_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BookkeeperError::EmptyName);
    }
    Ok(name.to_string())
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Turns change buffers into repository calls.
///
/// Reference columns are entered as category names and resolved against
/// `categories` (first match in key order wins).
pub struct CommitCoordinator<'a, C: ?Sized> {
    categories: &'a C,
}

impl<'a, C> CommitCoordinator<'a, C>
where
    C: Repository<Category> + ?Sized,
{
    pub fn new(categories: &'a C) -> Self {
        CommitCoordinator { categories }
    }

    // ------------------------------------------------------------------------
    // Grid batches
    // ------------------------------------------------------------------------

    /// Phase 1 for a grid batch: nothing is written
    pub fn validate<T, R>(&self, repo: &R, changes: &[Change]) -> Result<GridPlan<T>>
    where
        T: Entity,
        R: Repository<T> + ?Sized,
    {
        let tree = CategoryTree::load(self.categories)?;
        let mut rows = repo.count()? as i64;
        let mut steps = Vec::with_capacity(changes.len());

        for change in changes {
            let step = match change {
                Change::Add { column, value } => {
                    rows += 1;
                    let field = match (column, value.as_deref().map(str::trim)) {
                        (Some(column), Some(raw)) if !raw.is_empty() => {
                            let field = declared_field::<T>(column)?;
                            let location = format!("row {}, column {}", rows, field.name);
                            Some((field.name, resolve(field, raw, &location, &tree)?))
                        }
                        (Some(column), _) => {
                            declared_field::<T>(column)?;
                            None
                        }
                        (None, _) => None,
                    };
                    GridStep::Add { field }
                }
                Change::Update {
                    row,
                    column,
                    new_value,
                    ..
                } => {
                    check_row::<T>(*row, rows)?;
                    let field = declared_field::<T>(column)?;
                    let cleared = new_value.trim().is_empty();
                    let value = if cleared {
                        cleared_value::<T>(field)
                    } else {
                        let location = format!("row {}, column {}", row, field.name);
                        resolve(field, new_value, &location, &tree)?
                    };
                    if is_seed_row::<T>(*row) && field.name == "parent" && !value.is_null() {
                        return Err(BookkeeperError::ProtectedCategory(UNCATEGORIZED.to_string()));
                    }
                    GridStep::Update {
                        row: *row,
                        field: field.name,
                        value,
                        cleared,
                    }
                }
                Change::Delete { row } => {
                    check_row::<T>(*row, rows)?;
                    if is_seed_row::<T>(*row) {
                        return Err(BookkeeperError::ProtectedCategory(UNCATEGORIZED.to_string()));
                    }
                    rows -= 1;
                    GridStep::Delete { row: *row }
                }
            };
            steps.push(step);
        }

        Ok(GridPlan {
            steps,
            _entity: PhantomData,
        })
    }

    /// Phase 2 for a grid batch, in buffer order
    pub fn apply<T, R>(&self, repo: &R, plan: GridPlan<T>) -> Result<CommitReport>
    where
        T: Entity,
        R: Repository<T> + ?Sized,
    {
        let table = T::table_name();
        let mut report = CommitReport::default();

        for step in plan.steps {
            match step {
                GridStep::Add { field } => {
                    let id = repo.add_empty()?;
                    if let Some((name, value)) = field {
                        repo.update_field(id, name, value)?;
                    }
                    tracing::debug!(%table, id, "added row");
                    report.added += 1;
                }
                GridStep::Update {
                    row,
                    field,
                    value,
                    cleared,
                } => {
                    if cleared {
                        report.skipped += 1;
                    } else {
                        report.updated += 1;
                    }
                    tracing::debug!(%table, row, field, %value, "updated cell");
                    repo.update_field(row, field, value)?;
                }
                GridStep::Delete { row } => {
                    repo.delete(row)?;
                    tracing::debug!(%table, row, "deleted row");
                    report.deleted += 1;
                }
            }
        }

        Ok(report)
    }

    /// Validate and apply `buffer`, clearing it only when everything succeeded
    pub fn commit<T, R>(&self, repo: &R, buffer: &mut ChangeBuffer<Change>) -> Result<CommitReport>
    where
        T: Entity,
        R: Repository<T> + ?Sized,
    {
        let table = T::table_name();
        let plan = self.validate(repo, buffer.changes()).inspect_err(|e| {
            tracing::warn!(%table, pending = buffer.len(), error = %e, "batch rejected");
        })?;
        let report = self.apply(repo, plan)?;
        buffer.clear();

        tracing::info!(
            %table,
            added = report.added,
            updated = report.updated,
            deleted = report.deleted,
            skipped = report.skipped,
            "batch committed"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Tree batches
    // ------------------------------------------------------------------------

    /// Phase 1 for a category tree batch
    pub fn validate_tree(&self, changes: &[TreeChange]) -> Result<TreePlan> {
        let tree = CategoryTree::load(self.categories)?;
        let mut forest = NameForest::from_tree(&tree);
        let mut steps = Vec::with_capacity(changes.len());
        let mut skipped = 0;

        for change in changes {
            match change {
                TreeChange::Add { name, parent, .. } => {
                    let name = valid_name(name)?;
                    forest.check_free(&name, None)?;
                    let parent = trimmed(parent.as_deref());
                    let parent_index = parent
                        .as_deref()
                        .map(|p| forest.require(p, "Parent category"))
                        .transpose()?;
                    forest.nodes.push(ForestNode {
                        name: name.clone(),
                        parent: parent_index,
                        alive: true,
                    });
                    steps.push(TreeStep::Add { name, parent });
                }
                TreeChange::Rename {
                    new_name, old_name, ..
                } => {
                    let old_name = old_name.trim();
                    let target = forest.require(old_name, "Category")?;
                    let new_name = valid_name(new_name)?;
                    if new_name == old_name {
                        skipped += 1;
                        continue;
                    }
                    forest.check_free(&new_name, Some(target))?;
                    forest.nodes[target].name = new_name.clone();
                    steps.push(TreeStep::Rename {
                        from: old_name.to_string(),
                        to: new_name,
                    });
                }
                TreeChange::Move {
                    name, new_parent, ..
                } => {
                    let name = name.trim();
                    let target = forest.require(name, "Category")?;
                    let new_parent = trimmed(new_parent.as_deref());
                    let parent_index = match new_parent.as_deref() {
                        Some(p) => {
                            let index = forest.require(p, "Parent category")?;
                            if forest.is_within(index, target) {
                                return Err(BookkeeperError::Cycle {
                                    name: name.to_string(),
                                    parent: p.to_string(),
                                });
                            }
                            Some(index)
                        }
                        None => None,
                    };
                    if forest.is_seed(target) && parent_index.is_some() {
                        return Err(BookkeeperError::ProtectedCategory(name.to_string()));
                    }
                    forest.nodes[target].parent = parent_index;
                    steps.push(TreeStep::Move {
                        name: name.to_string(),
                        parent: new_parent,
                    });
                }
                TreeChange::Delete { name, .. } => {
                    let name = name.trim();
                    let target = forest.require(name, "Category")?;
                    if forest.seed.is_some_and(|seed| forest.is_within(seed, target)) {
                        return Err(BookkeeperError::ProtectedCategory(name.to_string()));
                    }
                    forest.remove_subtree(target);
                    steps.push(TreeStep::Delete {
                        name: name.to_string(),
                    });
                }
            }
        }

        Ok(TreePlan { steps, skipped })
    }

    /// Phase 2 for a category tree batch
    pub fn apply_tree(&self, plan: TreePlan) -> Result<CommitReport> {
        let repo = self.categories;
        let mut report = CommitReport {
            skipped: plan.skipped,
            ..CommitReport::default()
        };

        for step in plan.steps {
            match step {
                TreeStep::Add { name, parent } => {
                    let parent_pk = self.parent_key(parent.as_deref())?;
                    let id = repo.add_empty()?;
                    repo.update_field(id, "parent", FieldValue::from(parent_pk))?;
                    repo.update_field(id, "name", FieldValue::from(name.as_str()))?;
                    tracing::debug!(id, %name, "added category");
                    report.added += 1;
                }
                TreeStep::Rename { from, to } => {
                    let pk = self.category_key(&from)?;
                    repo.update_field(pk, "name", FieldValue::from(to.as_str()))?;
                    tracing::debug!(pk, %from, %to, "renamed category");
                    report.updated += 1;
                }
                TreeStep::Move { name, parent } => {
                    let pk = self.category_key(&name)?;
                    let parent_pk = self.parent_key(parent.as_deref())?;
                    repo.update_field(pk, "parent", FieldValue::from(parent_pk))?;
                    tracing::debug!(pk, %name, ?parent, "moved category");
                    report.updated += 1;
                }
                TreeStep::Delete { name } => {
                    let pk = self.category_key(&name)?;
                    repo.delete(pk)?;
                    tracing::debug!(pk, %name, "deleted category subtree");
                    report.deleted += 1;
                }
            }
        }

        Ok(report)
    }

    pub fn commit_tree(&self, buffer: &mut ChangeBuffer<TreeChange>) -> Result<CommitReport> {
        let plan = self.validate_tree(buffer.changes()).inspect_err(|e| {
            tracing::warn!(pending = buffer.len(), error = %e, "category batch rejected");
        })?;
        let report = self.apply_tree(plan)?;
        buffer.clear();

        tracing::info!(
            added = report.added,
            updated = report.updated,
            deleted = report.deleted,
            skipped = report.skipped,
            "category batch committed"
        );
        Ok(report)
    }

    fn category_key(&self, name: &str) -> Result<i64> {
        self.categories
            .get_all(Some(&Filter::eq("name", name)))?
            .first()
            .map(|c| c.pk)
            .ok_or_else(|| BookkeeperError::Reference {
                field: "Category".to_string(),
                value: name.to_string(),
            })
    }

    fn parent_key(&self, parent: Option<&str>) -> Result<Option<i64>> {
        parent.map(|p| self.category_key(p)).transpose()
    }
}

fn declared_field<T: Entity>(column: &str) -> Result<&'static Field> {
    T::field(column).ok_or_else(|| BookkeeperError::UnknownField {
        table: T::table_name(),
        column: column.to_string(),
    })
}

fn check_row<T: Entity>(row: i64, rows: i64) -> Result<()> {
    if row < 1 || row > rows {
        return Err(BookkeeperError::not_found(&T::table_name(), row));
    }
    Ok(())
}

/// Value stored for an emptied cell. A category reference falls back to
/// Uncategorized, except the tree's own parent link (empty = root).
fn cleared_value<T: Entity>(field: &Field) -> FieldValue {
    match field.kind {
        FieldKind::Reference { table, .. }
            if table == Category::table_name() && T::self_reference() != Some(field.name) =>
        {
            FieldValue::Integer(UNCATEGORIZED_ID)
        }
        _ => FieldValue::Null,
    }
}

/// Row 1 of the category table is the Uncategorized seed. Nothing sorts
/// before it, so its grid position never changes.
fn is_seed_row<T: Entity>(row: i64) -> bool {
    T::table_name() == Category::table_name() && row == UNCATEGORIZED_ID
}

/// Coerce user text for `field`, resolving category references by name
fn resolve(field: &Field, raw: &str, location: &str, tree: &CategoryTree) -> Result<FieldValue> {
    match field.kind {
        FieldKind::Reference { table, .. } if table == Category::table_name() => {
            let name = raw.trim();
            tree.find_by_name(name)
                .map(|c| FieldValue::Integer(c.pk))
                .ok_or_else(|| BookkeeperError::Reference {
                    field: format!("{} in {}", field.name, location),
                    value: name.to_string(),
                })
        }
        kind => coerce(kind, raw, location),
    }
}
