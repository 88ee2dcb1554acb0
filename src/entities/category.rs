// 🏷️ Category Entity - self-referential category forest
//
// Any number of roots, arbitrary depth. `parent` points at another category pk
// (None = root). Deleting a category removes its whole subtree; the repository
// renumbers survivors so keys stay dense.

use super::{next_value, Entity};
use crate::changes::NodeId;
use crate::error::Result;
use crate::fields::{Field, FieldKind, FieldValue};
use crate::repository::{Filter, Repository};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Name of the seed category every expense falls back to
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Key of the seed category
pub const UNCATEGORIZED_ID: i64 = 1;

const FIELDS: &[Field] = &[
    Field::new("name", FieldKind::Text),
    Field::new(
        "parent",
        FieldKind::Reference {
            table: "category",
            cascade: true,
        },
    ),
];

// ============================================================================
// CATEGORY ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,

    /// Parent category pk; None for roots
    pub parent: Option<i64>,

    pub pk: i64,
}

impl Category {
    pub fn new(name: impl Into<String>, parent: Option<i64>) -> Self {
        Category {
            name: name.into(),
            parent,
            pk: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Direct children, queried from the repository
    pub fn get_children<R>(&self, repo: &R) -> Result<Vec<Category>>
    where
        R: Repository<Category> + ?Sized,
    {
        repo.get_all(Some(&Filter::eq("parent", self.pk)))
    }

    /// All descendants (children, grandchildren, ...) in pre-order
    ///
    /// One repository query per visited node. Use [`CategoryTree`] when the
    /// whole forest is needed more than once.
    pub fn get_all_descendants<R>(&self, repo: &R) -> Result<Vec<Category>>
    where
        R: Repository<Category> + ?Sized,
    {
        let mut descendants = Vec::new();
        let mut seen = HashSet::from([self.pk]);
        collect_descendants(self, repo, &mut seen, &mut descendants)?;
        Ok(descendants)
    }
}

fn collect_descendants<R>(
    category: &Category,
    repo: &R,
    seen: &mut HashSet<i64>,
    out: &mut Vec<Category>,
) -> Result<()>
where
    R: Repository<Category> + ?Sized,
{
    for child in category.get_children(repo)? {
        if !seen.insert(child.pk) {
            continue;
        }
        out.push(child.clone());
        collect_descendants(&child, repo, seen, out)?;
    }
    Ok(())
}

impl Entity for Category {
    fn fields() -> &'static [Field] {
        FIELDS
    }

    fn pk(&self) -> i64 {
        self.pk
    }

    fn set_pk(&mut self, pk: i64) {
        self.pk = pk;
    }

    fn to_values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::from(self.name.as_str()),
            FieldValue::from(self.parent),
        ]
    }

    fn from_values(pk: i64, values: Vec<FieldValue>) -> Result<Self> {
        let mut values = values.into_iter();
        Ok(Category {
            name: next_value(&mut values).into_string(),
            parent: next_value(&mut values).as_i64(),
            pk,
        })
    }

    fn blank_values() -> Vec<FieldValue> {
        vec![FieldValue::Null, FieldValue::Null]
    }

    fn self_reference() -> Option<&'static str> {
        Some("parent")
    }
}

// ============================================================================
// CATEGORY TREE
// ============================================================================

/// One line of a rendered tree: the category, its depth, and a fresh node id
/// the UI can use to address edits to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineEntry {
    pub node: NodeId,
    pub pk: i64,
    pub name: String,
    pub depth: usize,
}

/// In-memory adjacency map over the whole category forest
///
/// Loaded once with a single repository query; every hierarchy question after
/// that is answered without touching the store.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    /// Categories in key order
    categories: Vec<Category>,
    by_pk: HashMap<i64, usize>,
    children: HashMap<Option<i64>, Vec<i64>>,
}

impl CategoryTree {
    pub fn load<R>(repo: &R) -> Result<Self>
    where
        R: Repository<Category> + ?Sized,
    {
        Ok(Self::from_categories(repo.get_all(None)?))
    }

    pub fn from_categories(mut categories: Vec<Category>) -> Self {
        categories.sort_by_key(|c| c.pk);

        let mut by_pk = HashMap::new();
        let mut children: HashMap<Option<i64>, Vec<i64>> = HashMap::new();
        for (index, category) in categories.iter().enumerate() {
            by_pk.insert(category.pk, index);
            children.entry(category.parent).or_default().push(category.pk);
        }

        CategoryTree {
            categories,
            by_pk,
            children,
        }
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, pk: i64) -> Option<&Category> {
        self.by_pk.get(&pk).map(|&index| &self.categories[index])
    }

    pub fn all(&self) -> &[Category] {
        &self.categories
    }

    /// Categories without a parent, plus any whose parent no longer exists
    pub fn roots(&self) -> Vec<&Category> {
        self.categories
            .iter()
            .filter(|c| c.parent.map_or(true, |p| !self.by_pk.contains_key(&p)))
            .collect()
    }

    pub fn children(&self, pk: i64) -> Vec<&Category> {
        self.children
            .get(&Some(pk))
            .map(|keys| keys.iter().filter_map(|k| self.get(*k)).collect())
            .unwrap_or_default()
    }

    /// All descendants of `pk` in pre-order
    pub fn descendants(&self, pk: i64) -> Vec<&Category> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([pk]);
        self.walk_descendants(pk, &mut seen, &mut out);
        out
    }

    fn walk_descendants<'a>(&'a self, pk: i64, seen: &mut HashSet<i64>, out: &mut Vec<&'a Category>) {
        for child in self.children(pk) {
            if seen.insert(child.pk) {
                out.push(child);
                self.walk_descendants(child.pk, seen, out);
            }
        }
    }

    pub fn parent(&self, category: &Category) -> Option<&Category> {
        category.parent.and_then(|p| self.get(p))
    }

    /// Names from the root down to `category`
    ///
    /// Example: "Fast Food" → ["Food", "Restaurants", "Fast Food"]
    pub fn path(&self, category: &Category) -> Vec<String> {
        let mut path = vec![category.name.clone()];
        let mut seen = HashSet::from([category.pk]);
        let mut current = category;

        while let Some(parent) = self.parent(current) {
            if !seen.insert(parent.pk) {
                break;
            }
            path.insert(0, parent.name.clone());
            current = parent;
        }

        path
    }

    pub fn path_string(&self, category: &Category) -> String {
        self.path(category).join(" → ")
    }

    pub fn depth(&self, category: &Category) -> usize {
        self.path(category).len() - 1
    }

    /// True when `ancestor` is `descendant` or one of its ancestors
    pub fn is_ancestor(&self, ancestor: i64, descendant: i64) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(descendant);

        while let Some(pk) = current {
            if pk == ancestor {
                return true;
            }
            if !seen.insert(pk) {
                return false;
            }
            current = self.get(pk).and_then(|c| c.parent);
        }

        false
    }

    /// First category (in key order) with exactly this name
    pub fn find_by_name(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }

    /// Pre-order listing of the forest for tree rendering
    pub fn outline(&self) -> Vec<OutlineEntry> {
        let mut entries = Vec::with_capacity(self.categories.len());
        for root in self.roots() {
            entries.push(self.outline_entry(root, 0));
            let base = self.depth(root);
            for descendant in self.descendants(root.pk) {
                let depth = self.depth(descendant) - base;
                entries.push(self.outline_entry(descendant, depth));
            }
        }
        entries
    }

    fn outline_entry(&self, category: &Category, depth: usize) -> OutlineEntry {
        OutlineEntry {
            node: NodeId::new(),
            pk: category.pk,
            name: category.name.clone(),
            depth,
        }
    }

    /// Placeholder name for a freshly created node: `untitled1`, `untitled2`, ...
    pub fn next_untitled_name(&self) -> String {
        next_untitled_name(self.names())
    }
}

/// `untitled<N+1>` where N is the highest number already used
pub fn next_untitled_name<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let highest = names
        .into_iter()
        .filter_map(|name| name.strip_prefix("untitled"))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("untitled{}", highest + 1)
}

// ============================================================================
// TESTS
// ============================================================================
