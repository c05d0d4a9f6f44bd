//! Cross-adapter query federation.
//!
//! A [`QueryFederator`] runs the primary select for an entity on its own
//! adapter, passing same-adapter associations down as hints, then resolves
//! every remote association through a [`RelationResolver`] and merges the
//! results into the primary rows under the association property.

use crate::config::{FederationConfig, UnmatchedPolicy};
use crate::resolver::RelationResolver;
use fedorm_core::error::{AssociationConfigError, Result};
use fedorm_core::{
    AdapterRegistry, AssociationDescriptor, EntityMeta, Filter, FromRow, OrderBy, Relation, Row,
    SelectOne, SelectQuery, Value,
};
use std::sync::Arc;

/// Parameters of a primary select.
#[derive(Debug, Clone, Default)]
pub struct SelectRequest {
    filter: Option<Filter>,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    fields: Option<Vec<String>>,
    with: Vec<String>,
}

impl SelectRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate; repeated calls are ANDed.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(Filter::and_optional(self.filter.take(), filter));
        self
    }

    #[must_use]
    pub fn order_by(mut self, term: OrderBy) -> Self {
        self.order_by.push(term);
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

    /// Explicit projection. The primary key is always added.
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Request an association by property name.
    #[must_use]
    pub fn with(mut self, property: impl Into<String>) -> Self {
        let property = property.into();
        if !self.with.contains(&property) {
            self.with.push(property);
        }
        self
    }
}

/// Rows returned by a federated select.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    rows: Vec<Row>,
    fields: Vec<String>,
}

impl Selection {
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Fields the caller asked for, plus the primary key.
    ///
    /// Keys added only to correlate remote associations are present on the
    /// rows but not listed here.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl IntoIterator for Selection {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// What a select will do, worked out before any adapter call.
#[derive(Debug)]
struct SelectPlan {
    local: Vec<Arc<AssociationDescriptor>>,
    remote: Vec<Arc<AssociationDescriptor>>,
    /// Fields sent to the adapter.
    query_fields: Vec<String>,
    /// Fields reported to the caller.
    public_fields: Vec<String>,
}

/// Runs selects that may span several adapters.
#[derive(Debug, Clone)]
pub struct QueryFederator<'a> {
    adapters: &'a AdapterRegistry,
    config: FederationConfig,
}

impl<'a> QueryFederator<'a> {
    pub fn new(adapters: &'a AdapterRegistry) -> Self {
        Self {
            adapters,
            config: FederationConfig::default(),
        }
    }

    /// Use the given configuration (builder pattern).
    #[must_use]
    pub fn with_config(mut self, config: FederationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Select rows of `entity` and merge the requested associations.
    #[tracing::instrument(level = "debug", skip(self, entity, request), fields(entity = %entity.name()))]
    pub fn select_many(&self, entity: &EntityMeta, request: &SelectRequest) -> Result<Selection> {
        let plan = plan(entity, request.fields.as_deref(), &request.with)?;
        let adapter = self.adapters.get(entity.adapter())?;

        let query = SelectQuery {
            resource: entity.resource().to_string(),
            fields: plan.query_fields.clone(),
            filter: request.filter.clone(),
            order_by: request.order_by.clone(),
            limit: request.limit,
            offset: request.offset,
            hints: plan.local.clone(),
        };
        tracing::trace!(
            adapter = entity.adapter(),
            resource = entity.resource(),
            local = plan.local.len(),
            remote = plan.remote.len(),
            "Primary select"
        );
        let mut rows = adapter.select(&query)?;

        if !rows.is_empty() {
            self.merge_remote(&plan.remote, &mut rows)?;
        }

        tracing::debug!(
            entity = entity.name(),
            rows = rows.len(),
            remote_associations = plan.remote.len(),
            "Federated select complete"
        );
        Ok(Selection {
            rows,
            fields: plan.public_fields,
        })
    }

    /// Select one row of `entity` by primary key and merge the requested associations.
    ///
    /// Only the projection and association parts of `request` are used. An
    /// empty key selects nothing and makes no adapter call.
    #[tracing::instrument(level = "debug", skip(self, entity, key, request), fields(entity = %entity.name()))]
    pub fn select_one(
        &self,
        entity: &EntityMeta,
        key: impl Into<Value>,
        request: &SelectRequest,
    ) -> Result<Option<Row>> {
        let key = key.into();
        let plan = plan(entity, request.fields.as_deref(), &request.with)?;
        let Some(pk) = entity.primary_key_field() else {
            return Err(AssociationConfigError::new(format!(
                "entity '{}' has no primary key to select by",
                entity.name()
            ))
            .into());
        };
        if key.is_empty_key() {
            return Ok(None);
        }

        let adapter = self.adapters.get(entity.adapter())?;
        let query = SelectOne::new(entity.resource(), pk, key)
            .fields(plan.query_fields.clone())
            .hints(plan.local.clone());
        let Some(row) = adapter.select_one(&query)? else {
            return Ok(None);
        };

        let mut rows = vec![row];
        self.merge_remote(&plan.remote, &mut rows)?;
        Ok(rows.pop())
    }

    /// [`QueryFederator::select_many`], mapped through [`FromRow`].
    pub fn select_many_as<T: FromRow>(&self, entity: &EntityMeta, request: &SelectRequest) -> Result<Vec<T>> {
        self.select_many(entity, request)?
            .rows()
            .iter()
            .map(T::from_row)
            .collect()
    }

    /// [`QueryFederator::select_one`], mapped through [`FromRow`].
    pub fn select_one_as<T: FromRow>(
        &self,
        entity: &EntityMeta,
        key: impl Into<Value>,
        request: &SelectRequest,
    ) -> Result<Option<T>> {
        self.select_one(entity, key, request)?
            .as_ref()
            .map(T::from_row)
            .transpose()
    }

    fn merge_remote(&self, remote: &[Arc<AssociationDescriptor>], rows: &mut [Row]) -> Result<()> {
        let resolver = RelationResolver::new(self.adapters, &self.config);
        for descriptor in remote {
            let field = correlation_field(descriptor)?;
            let keys: Vec<Value> = rows
                .iter()
                .filter_map(|row| row.get_by_name(field).cloned())
                .collect();
            let resolved = resolver.load(descriptor, &keys)?;

            let mut unmatched = 0_usize;
            for row in rows.iter_mut() {
                let matched = row
                    .get_by_name(field)
                    .and_then(Value::to_key)
                    .and_then(|key| resolved.get(&key));
                if let Some(relation) = matched {
                    row.set_relation(descriptor.property(), relation.clone());
                    continue;
                }
                unmatched += 1;
                if self.config.unmatched == UnmatchedPolicy::Empty && descriptor.is_collection() {
                    row.set_relation(descriptor.property(), Relation::Many(Vec::new()));
                }
            }
            tracing::trace!(
                association = %descriptor.property(),
                matched = rows.len() - unmatched,
                unmatched = unmatched,
                "Merged remote association"
            );
        }
        Ok(())
    }
}

fn correlation_field(descriptor: &AssociationDescriptor) -> Result<&str> {
    descriptor.correlation_field().ok_or_else(|| {
        AssociationConfigError::new(format!(
            "source entity '{}' has no primary key to correlate on",
            descriptor.source().name
        ))
        .for_association(descriptor.property())
        .into()
    })
}

/// Partition associations and work out the projection.
fn plan(entity: &EntityMeta, fields: Option<&[String]>, with: &[String]) -> Result<SelectPlan> {
    let mut local = Vec::new();
    let mut remote = Vec::new();
    for property in with {
        let descriptor = entity.association(property).ok_or_else(|| {
            AssociationConfigError::new(format!("entity '{}' has no such association", entity.name()))
                .for_association(property)
        })?;
        if descriptor.is_remote() {
            correlation_field(descriptor)?;
            remote.push(Arc::clone(descriptor));
        } else {
            local.push(Arc::clone(descriptor));
        }
    }

    let public_fields = match fields {
        None => entity.stored_fields(),
        Some(requested) => {
            let mut public = Vec::with_capacity(requested.len() + 1);
            for name in requested {
                match entity.declared_fields().iter().find(|f| &f.name == name) {
                    None => {
                        return Err(AssociationConfigError::new(format!(
                            "entity '{}' has no field '{}'",
                            entity.name(),
                            name
                        ))
                        .into());
                    }
                    Some(field) if field.computed => {
                        return Err(AssociationConfigError::new(format!(
                            "field '{}' of '{}' is computed and cannot be selected",
                            name,
                            entity.name()
                        ))
                        .into());
                    }
                    Some(_) => {
                        if !public.contains(name) {
                            public.push(name.clone());
                        }
                    }
                }
            }
            if let Some(pk) = entity.primary_key_field() {
                if !public.iter().any(|f| f == pk) {
                    public.push(pk.to_string());
                }
            }
            public
        }
    };

    let mut query_fields = public_fields.clone();
    for descriptor in &remote {
        if let Some(key) = descriptor.referencing_key() {
            if !query_fields.iter().any(|f| f == key) {
                query_fields.push(key.to_string());
            }
        }
    }

    Ok(SelectPlan {
        local,
        remote,
        query_fields,
        public_fields,
    })
}
