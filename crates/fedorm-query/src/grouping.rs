//! In-memory grouping join.
//!
//! Rows fetched by separate selects are stitched back together by key here,
//! never by the stores. Keys are [`KeyValue`]s, so `Int(1)` from one adapter
//! lines up with `BigInt(1)` from another.

use fedorm_core::error::{AssociationConfigError, Result};
use fedorm_core::{KeyValue, Row};
use std::collections::BTreeMap;

/// A nested grouping keyed by field values.
pub type GroupMap = BTreeMap<KeyValue, Grouped>;

/// One level of a [`GroupMap`].
#[derive(Debug, Clone, PartialEq)]
pub enum Grouped {
    /// Leaf level: the row itself.
    Row(Row),
    /// Intermediate level: the next grouping.
    Group(GroupMap),
}

impl Grouped {
    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Grouped::Row(row) => Some(row),
            Grouped::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupMap> {
        match self {
            Grouped::Group(map) => Some(map),
            Grouped::Row(_) => None,
        }
    }
}

/// Read the grouping key of `row` from `field`.
///
/// A missing field is a configuration error. An empty value (NULL, `""`)
/// yields `None`: such rows cannot correlate and are left out.
fn key_of(row: &Row, field: &str) -> Result<Option<KeyValue>> {
    match row.get_by_name(field) {
        Some(value) => Ok(value.to_key()),
        None => Err(AssociationConfigError::new(format!(
            "row has no field '{}' to group by",
            field
        ))
        .into()),
    }
}

/// Group rows into a nested map, one level per key field.
///
/// The last level maps each key to its row, later rows overwriting earlier
/// ones. Rows whose key at any level is empty are skipped.
pub fn group<S: AsRef<str>>(rows: Vec<Row>, keys: &[S]) -> Result<GroupMap> {
    if keys.is_empty() {
        return Err(AssociationConfigError::new("grouping needs at least one key field").into());
    }
    group_level(rows, keys)
}

fn group_level<S: AsRef<str>>(rows: Vec<Row>, keys: &[S]) -> Result<GroupMap> {
    let field = keys[0].as_ref();
    let rest = &keys[1..];

    if rest.is_empty() {
        let mut map = GroupMap::new();
        for row in rows {
            if let Some(key) = key_of(&row, field)? {
                map.insert(key, Grouped::Row(row));
            }
        }
        return Ok(map);
    }

    let partitions = bucket_by(rows, field)?;
    let mut map = GroupMap::new();
    for (key, partition) in partitions {
        map.insert(key, Grouped::Group(group_level(partition, rest)?));
    }
    Ok(map)
}

/// Leaf rows of a grouped map, depth-first in key order.
pub fn flatten(map: &GroupMap) -> Vec<&Row> {
    let mut out = Vec::new();
    collect_leaves(map, &mut out);
    out
}

fn collect_leaves<'a>(map: &'a GroupMap, out: &mut Vec<&'a Row>) {
    for grouped in map.values() {
        match grouped {
            Grouped::Row(row) => out.push(row),
            Grouped::Group(inner) => collect_leaves(inner, out),
        }
    }
}

/// Index rows by one field; the last row wins on duplicate keys.
pub fn index_by(rows: Vec<Row>, field: &str) -> Result<BTreeMap<KeyValue, Row>> {
    let mut index = BTreeMap::new();
    for row in rows {
        if let Some(key) = key_of(&row, field)? {
            index.insert(key, row);
        }
    }
    Ok(index)
}

/// Bucket rows by one field, preserving input order within each bucket.
pub fn bucket_by(rows: Vec<Row>, field: &str) -> Result<BTreeMap<KeyValue, Vec<Row>>> {
    let mut buckets: BTreeMap<KeyValue, Vec<Row>> = BTreeMap::new();
    for row in rows {
        if let Some(key) = key_of(&row, field)? {
            buckets.entry(key).or_default().push(row);
        }
    }
    Ok(buckets)
}
