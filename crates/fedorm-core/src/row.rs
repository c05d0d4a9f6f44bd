//! Untyped rows as exchanged with adapters.

use crate::Result;
use crate::error::Error;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Field names of a row, with a name index.
///
/// Kept behind an `Arc` so cloned and projected rows share one copy until a
/// field is added.
#[derive(Debug, Clone, PartialEq, Default)]
struct ColumnInfo {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl ColumnInfo {
    fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, index }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    fn push(&mut self, name: String) -> usize {
        let position = self.names.len();
        self.index.insert(name.clone(), position);
        self.names.push(name);
        position
    }
}

/// Related data merged into a row under an association property.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// ManyToOne / OneToOne
    One(Row),
    /// OneToMany / ManyToMany
    Many(Vec<Row>),
}

impl Relation {
    /// The single related row, if this is a single-valued relation.
    pub fn as_one(&self) -> Option<&Row> {
        match self {
            Relation::One(row) => Some(row),
            Relation::Many(_) => None,
        }
    }

    /// The related rows, if this is a collection.
    pub fn as_many(&self) -> Option<&[Row]> {
        match self {
            Relation::One(_) => None,
            Relation::Many(rows) => Some(rows),
        }
    }

    /// Number of related rows.
    pub fn len(&self) -> usize {
        match self {
            Relation::One(_) => 1,
            Relation::Many(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Relation::One(row) => row.to_json(),
            Relation::Many(rows) => serde_json::Value::Array(rows.iter().map(Row::to_json).collect()),
        }
    }
}

/// A single row returned from, or sent to, an adapter.
///
/// Rows provide index- and name-based field access. Association data
/// resolved after the primary select is attached as named [`Relation`]s,
/// kept apart from the plain fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
    relations: BTreeMap<String, Relation>,
}

impl Row {
    /// Create a row from parallel name and value lists.
    ///
    /// Missing trailing values are filled with NULL; surplus values are dropped.
    pub fn new(column_names: Vec<String>, mut values: Vec<Value>) -> Self {
        values.resize(column_names.len(), Value::Null);
        Self {
            values,
            columns: Arc::new(ColumnInfo::new(column_names)),
            relations: BTreeMap::new(),
        }
    }

    /// Build a row from `(name, value)` pairs. Later duplicates overwrite earlier ones.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut row = Row::default();
        for (name, value) in pairs {
            row.set(name, value);
        }
        row
    }

    /// Number of plain fields (relations are not counted).
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by field index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by field name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.position(name).and_then(|i| self.values.get(i))
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.position(name).is_some()
    }

    /// Set a field, appending it if the row does not have it yet.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self
            .columns
            .position(&name)
            .and_then(|i| self.values.get_mut(i))
        {
            *slot = value;
            return;
        }
        let position = Arc::make_mut(&mut self.columns).push(name);
        self.values.resize(position, Value::Null);
        self.values.push(value);
    }

    /// Builder form of [`Row::set`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Keep only the named fields, in the given order. Missing names are skipped.
    #[must_use]
    pub fn project(&self, names: &[String]) -> Row {
        let mut projected = Row::default();
        for name in names {
            if let Some(value) = self.get_by_name(name) {
                projected.set(name.clone(), value.clone());
            }
        }
        projected.relations = self.relations.clone();
        projected
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names.iter().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Iterate over (field_name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Attach resolved association data under `property`.
    pub fn set_relation(&mut self, property: impl Into<String>, relation: Relation) {
        self.relations.insert(property.into(), relation);
    }

    pub fn relation(&self, property: &str) -> Option<&Relation> {
        self.relations.get(property)
    }

    pub fn has_relation(&self, property: &str) -> bool {
        self.relations.contains_key(property)
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &Relation)> {
        self.relations.iter().map(|(name, rel)| (name.as_str(), rel))
    }

    /// Render the row as a JSON object, relations nested under their property names.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, value) in self.iter() {
            map.insert(name.to_string(), value.to_json());
        }
        for (name, relation) in &self.relations {
            map.insert(name.clone(), relation.to_json());
        }
        serde_json::Value::Object(map)
    }
}

/// Mapping from a merged row to an application entity.
///
/// This is the seam to the entity-mapping layer: implement it by hand, or
/// route through serde with [`hydrate`].
pub trait FromRow: Sized {
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

impl FromRow for serde_json::Value {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.to_json())
    }
}

/// Deserialize a row (relations included) into any `serde` type.
#[allow(clippy::result_large_err)]
pub fn hydrate<T: serde::de::DeserializeOwned>(row: &Row) -> Result<T> {
    serde_json::from_value(row.to_json()).map_err(Error::from)
}
