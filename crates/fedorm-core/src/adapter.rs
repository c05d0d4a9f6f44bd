//! The adapter contract.
//!
//! An [`Adapter`] fronts one backing store (a SQL database, a document store,
//! a REST service, an in-process table set). The resolution and persistence
//! engines only ever talk to stores through this trait; they never build
//! store-specific queries themselves.
//!
//! Adapters are registered by name in an [`AdapterRegistry`]. Entity metadata
//! refers to adapters by that name.

use crate::association::AssociationDescriptor;
use crate::error::{AdapterError, AdapterErrorKind, Error, Result};
use crate::filter::{Filter, col};
use crate::order::OrderBy;
use crate::row::Row;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A multi-row select.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub resource: String,
    /// Fields to return; empty means every field the store has.
    pub fields: Vec<String>,
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Same-adapter associations the store should embed under their property.
    pub hints: Vec<Arc<AssociationDescriptor>>,
}

impl SelectQuery {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn order_by(mut self, order_by: Vec<OrderBy>) -> Self {
        self.order_by = order_by;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn hints(mut self, hints: Vec<Arc<AssociationDescriptor>>) -> Self {
        self.hints = hints;
        self
    }
}

/// A single-row select by key.
#[derive(Debug, Clone)]
pub struct SelectOne {
    pub resource: String,
    pub key_field: String,
    pub key: Value,
    /// Fields to return; empty means every field the store has.
    pub fields: Vec<String>,
    pub hints: Vec<Arc<AssociationDescriptor>>,
}

impl SelectOne {
    pub fn new(resource: impl Into<String>, key_field: impl Into<String>, key: impl Into<Value>) -> Self {
        Self {
            resource: resource.into(),
            key_field: key_field.into(),
            key: key.into(),
            fields: Vec::new(),
            hints: Vec::new(),
        }
    }

    #[must_use]
    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn hints(mut self, hints: Vec<Arc<AssociationDescriptor>>) -> Self {
        self.hints = hints;
        self
    }

    /// The equivalent multi-row query.
    pub fn as_query(&self) -> SelectQuery {
        SelectQuery {
            resource: self.resource.clone(),
            fields: self.fields.clone(),
            filter: Some(col(self.key_field.clone()).eq(self.key.clone())),
            order_by: Vec::new(),
            limit: Some(1),
            offset: None,
            hints: self.hints.clone(),
        }
    }
}

/// A batch of join-resource rows to create or remove for one source key.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRequest {
    pub join_resource: String,
    pub join_key_for_source: String,
    pub join_key_for_target: String,
    pub source_key: Value,
    pub target_keys: Vec<Value>,
}

impl LinkRequest {
    /// Build a request for a ManyToMany descriptor.
    pub fn for_association(
        descriptor: &AssociationDescriptor,
        source_key: Value,
        target_keys: Vec<Value>,
    ) -> Result<Self> {
        match (
            descriptor.join_resource(),
            descriptor.join_key_for_source(),
            descriptor.join_key_for_target(),
        ) {
            (Some(resource), Some(source_field), Some(target_field)) => Ok(Self {
                join_resource: resource.to_string(),
                join_key_for_source: source_field.to_string(),
                join_key_for_target: target_field.to_string(),
                source_key,
                target_keys,
            }),
            _ => Err(Error::AssociationConfig(
                crate::error::AssociationConfigError::new(format!(
                    "{} association has no join resource",
                    descriptor.kind()
                ))
                .for_association(descriptor.property()),
            )),
        }
    }

    /// One join row per target key.
    pub fn join_rows(&self) -> impl Iterator<Item = Row> + '_ {
        self.target_keys.iter().map(|target| {
            Row::from_pairs([
                (self.join_key_for_source.clone(), self.source_key.clone()),
                (self.join_key_for_target.clone(), target.clone()),
            ])
        })
    }

    /// Filter matching exactly the join rows of this request.
    pub fn filter(&self) -> Filter {
        col(self.join_key_for_source.clone())
            .eq(self.source_key.clone())
            .and(col(self.join_key_for_target.clone()).in_list(self.target_keys.iter().cloned()))
    }
}

/// One backing store.
///
/// Every call is a blocking round trip. Implementations report failures as
/// [`Error::Adapter`] and are shared across threads behind an `Arc`.
pub trait Adapter: Send + Sync {
    /// Name this adapter is registered under.
    fn name(&self) -> &str;

    /// Fetch rows matching the query.
    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>>;

    /// Fetch at most one row by key.
    fn select_one(&self, query: &SelectOne) -> Result<Option<Row>> {
        Ok(self.select(&query.as_query())?.into_iter().next())
    }

    /// Insert a row. Returns the generated key, if the store produced one.
    fn insert(&self, resource: &str, values: &Row) -> Result<Option<Value>>;

    /// Update rows matching `filter`. Returns the number of affected rows.
    fn update(&self, resource: &str, filter: &Filter, values: &Row) -> Result<u64>;

    /// Update one row by key. Returns whether a row was affected.
    fn update_one(&self, resource: &str, key_field: &str, key: &Value, values: &Row) -> Result<bool> {
        let filter = col(key_field).eq(key.clone());
        Ok(self.update(resource, &filter, values)? > 0)
    }

    /// Delete rows matching `filter`. Returns the number of affected rows.
    fn delete(&self, resource: &str, filter: &Filter) -> Result<u64>;

    /// Delete one row by key. Returns whether a row was affected.
    fn delete_one(&self, resource: &str, key_field: &str, key: &Value) -> Result<bool> {
        let filter = col(key_field).eq(key.clone());
        Ok(self.delete(resource, &filter)? > 0)
    }

    /// Create join rows. Defaults to one `insert` per target key.
    fn link_many_to_many(&self, link: &LinkRequest) -> Result<u64> {
        let mut linked = 0;
        for row in link.join_rows() {
            self.insert(&link.join_resource, &row)?;
            linked += 1;
        }
        Ok(linked)
    }

    /// Remove join rows. Defaults to a single filtered `delete`.
    fn unlink_many_to_many(&self, link: &LinkRequest) -> Result<u64> {
        if link.target_keys.is_empty() {
            return Ok(0);
        }
        self.delete(&link.join_resource, &link.filter())
    }
}

/// Named set of adapters.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn Adapter>) -> &mut Self {
        let name = adapter.name().to_string();
        self.adapters.insert(name, adapter);
        self
    }

    /// Builder form of [`AdapterRegistry::register`].
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Look up an adapter by name.
    pub fn get(&self, name: &str) -> Result<&dyn Adapter> {
        self.adapters
            .get(name)
            .map(|a| &**a)
            .ok_or_else(|| {
                Error::Adapter(AdapterError::new(
                    name,
                    AdapterErrorKind::NotRegistered,
                    format!("no adapter registered under '{}'", name),
                ))
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::{AssociationKind, DefinitionTokens};
    use crate::entity::EntityMeta;
    use std::sync::Mutex;

    /// Minimal adapter exercising the default methods.
    #[derive(Default)]
    struct Scratch {
        rows: Mutex<Vec<(String, Row)>>,
    }

    impl Adapter for Scratch {
        fn name(&self) -> &str {
            "scratch"
        }

        fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .filter(|(r, row)| {
                    *r == query.resource && query.filter.as_ref().is_none_or(|f| f.matches(row))
                })
                .map(|(_, row)| row.clone())
                .take(query.limit.map_or(usize::MAX, |l| l as usize))
                .collect())
        }

        fn insert(&self, resource: &str, values: &Row) -> Result<Option<Value>> {
            self.rows
                .lock()
                .unwrap()
                .push((resource.to_string(), values.clone()));
            Ok(None)
        }

        fn update(&self, _resource: &str, _filter: &Filter, _values: &Row) -> Result<u64> {
            Ok(0)
        }

        fn delete(&self, resource: &str, filter: &Filter) -> Result<u64> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|(r, row)| !(r == resource && filter.matches(row)));
            Ok((before - rows.len()) as u64)
        }
    }

    fn tags_descriptor() -> AssociationDescriptor {
        let post = EntityMeta::new("Post", "scratch", "posts").primary_key("id");
        let tag = EntityMeta::new("Tag", "scratch", "tags").primary_key("id");
        AssociationDescriptor::create(
            AssociationKind::ManyToMany,
            "tags",
            &post,
            &tag,
            DefinitionTokens::new()
                .join_resource("post_tags")
                .join_key_for_source("post_id")
                .join_key_for_target("tag_id"),
            false,
        )
        .unwrap()
    }

    #[test]
    fn default_link_and_unlink_use_crud() {
        let adapter = Scratch::default();
        let link = LinkRequest::for_association(
            &tags_descriptor(),
            Value::Int(1),
            vec![Value::Int(10), Value::Int(11)],
        )
        .unwrap();
        assert_eq!(adapter.link_many_to_many(&link).unwrap(), 2);

        let rows = adapter.select(&SelectQuery::new("post_tags")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get_by_name("tag_id"), Some(&Value::Int(11)));

        let unlink = LinkRequest {
            target_keys: vec![Value::Int(10)],
            ..link
        };
        assert_eq!(adapter.unlink_many_to_many(&unlink).unwrap(), 1);
        let rows = adapter.select(&SelectQuery::new("post_tags")).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn default_select_one_uses_select() {
        let adapter = Scratch::default();
        adapter
            .insert("posts", &Row::from_pairs([("id", 1_i64)]))
            .unwrap();
        adapter
            .insert("posts", &Row::from_pairs([("id", 2_i64)]))
            .unwrap();
        let row = adapter
            .select_one(&SelectOne::new("posts", "id", 2_i64))
            .unwrap()
            .unwrap();
        assert_eq!(row.get_by_name("id"), Some(&Value::BigInt(2)));
        assert!(
            adapter
                .select_one(&SelectOne::new("posts", "id", 3_i64))
                .unwrap()
                .is_none()
        );
        assert!(adapter.delete_one("posts", "id", &Value::Int(1)).unwrap());
    }

    #[test]
    fn link_request_requires_many_to_many() {
        let post = EntityMeta::new("Post", "scratch", "posts")
            .primary_key("id")
            .field("author_id");
        let author = EntityMeta::new("Author", "scratch", "authors").primary_key("id");
        let d = AssociationDescriptor::create(
            AssociationKind::ManyToOne,
            "author",
            &post,
            &author,
            DefinitionTokens::new().referencing_key("author_id"),
            false,
        )
        .unwrap();
        assert!(LinkRequest::for_association(&d, Value::Int(1), vec![]).is_err());
    }

    #[test]
    fn registry_reports_unknown_adapters() {
        let registry = AdapterRegistry::new().with(Arc::new(Scratch::default()));
        assert!(registry.contains("scratch"));
        assert_eq!(registry.get("scratch").unwrap().name(), "scratch");
        let err = registry.get("rest").err().unwrap();
        match err {
            Error::Adapter(e) => assert_eq!(e.kind, AdapterErrorKind::NotRegistered),
            other => panic!("unexpected error: {other}"),
        }
    }
}
