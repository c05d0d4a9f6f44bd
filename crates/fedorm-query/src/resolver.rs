//! Relation resolution.
//!
//! [`RelationResolver::load`] takes an association and the correlation values
//! collected from source rows, issues the selects needed to fetch related
//! rows, and returns them keyed by correlation value:
//!
//! | kind | round trips | result per key |
//! |---|---|---|
//! | OneToOne, ManyToOne | 1 (target) | one row |
//! | OneToMany | 1 (target) | rows in target order |
//! | ManyToMany | 2 (join, then target) | rows in target order |
//!
//! Long `IN` lists are split per [`FederationConfig::max_in_list`], which
//! adds round trips but never changes the result.

use crate::config::FederationConfig;
use crate::grouping::{Grouped, bucket_by, group, index_by};
use fedorm_core::error::{AssociationConfigError, JoinIntegrityError, Result};
use fedorm_core::{
    Adapter, AdapterRegistry, AssociationDescriptor, AssociationKind, KeyValue, Relation, Row,
    SelectQuery, Value, col, distinct_values,
};
use std::collections::BTreeMap;

/// Related rows keyed by correlation value.
pub type Resolved = BTreeMap<KeyValue, Relation>;

/// Loads related rows for a batch of source keys.
#[derive(Debug, Clone, Copy)]
pub struct RelationResolver<'a> {
    adapters: &'a AdapterRegistry,
    config: &'a FederationConfig,
}

impl<'a> RelationResolver<'a> {
    pub fn new(adapters: &'a AdapterRegistry, config: &'a FederationConfig) -> Self {
        Self { adapters, config }
    }

    /// Resolve `descriptor` for the given source correlation values.
    ///
    /// NULL and empty values are dropped and duplicates collapsed first; if
    /// nothing remains the result is empty and no adapter is called.
    #[tracing::instrument(
        level = "debug",
        skip(self, descriptor, source_keys),
        fields(association = %descriptor.property(), kind = %descriptor.kind(), keys = source_keys.len())
    )]
    pub fn load(&self, descriptor: &AssociationDescriptor, source_keys: &[Value]) -> Result<Resolved> {
        let values = distinct_values(source_keys);
        if values.is_empty() {
            tracing::trace!("No usable source keys, skipping resolution");
            return Ok(Resolved::new());
        }

        let mut round_trips = 0;
        let resolved = match descriptor.kind() {
            AssociationKind::OneToOne | AssociationKind::ManyToOne => {
                self.load_single(descriptor, &values, &mut round_trips)?
            }
            AssociationKind::OneToMany => self.load_one_to_many(descriptor, &values, &mut round_trips)?,
            AssociationKind::ManyToMany => {
                self.load_many_to_many(descriptor, &values, &mut round_trips)?
            }
        };

        tracing::debug!(
            association = %descriptor.property(),
            source_keys = values.len(),
            resolved_keys = resolved.len(),
            round_trips = round_trips,
            "Relation resolution complete"
        );
        Ok(resolved)
    }

    fn load_single(
        &self,
        descriptor: &AssociationDescriptor,
        values: &[Value],
        round_trips: &mut usize,
    ) -> Result<Resolved> {
        let target = descriptor.target();
        let adapter = self.adapters.get(&target.adapter)?;
        let field = descriptor.target_field();
        let rows = self.select_in(
            adapter,
            SelectQuery::new(&target.resource),
            field,
            values,
            round_trips,
        )?;
        Ok(index_by(rows, field)?
            .into_iter()
            .map(|(key, row)| (key, Relation::One(row)))
            .collect())
    }

    fn load_one_to_many(
        &self,
        descriptor: &AssociationDescriptor,
        values: &[Value],
        round_trips: &mut usize,
    ) -> Result<Resolved> {
        let target = descriptor.target();
        let adapter = self.adapters.get(&target.adapter)?;
        let field = descriptor.target_field();
        let query = SelectQuery::new(&target.resource).order_by(descriptor.order_by().to_vec());
        let rows = self.select_in(adapter, query, field, values, round_trips)?;
        Ok(bucket_by(rows, field)?
            .into_iter()
            .map(|(key, rows)| (key, Relation::Many(rows)))
            .collect())
    }

    fn load_many_to_many(
        &self,
        descriptor: &AssociationDescriptor,
        values: &[Value],
        round_trips: &mut usize,
    ) -> Result<Resolved> {
        let missing_token =
            || AssociationConfigError::new("join keys missing").for_association(descriptor.property());
        let join_adapter_name = descriptor.join_adapter().ok_or_else(missing_token)?;
        let join_resource = descriptor.join_resource().ok_or_else(missing_token)?;
        let source_field = descriptor.join_key_for_source().ok_or_else(missing_token)?;
        let target_field = descriptor.join_key_for_target().ok_or_else(missing_token)?;

        let join_adapter = self.adapters.get(join_adapter_name)?;
        let join_query = SelectQuery::new(join_resource).fields([target_field, source_field]);
        let join_rows = self.select_in(join_adapter, join_query, source_field, values, round_trips)?;
        if join_rows.is_empty() {
            return Ok(Resolved::new());
        }

        // Target keys in their native form, for the second IN list.
        let target_values = distinct_values(join_rows.iter().filter_map(|r| r.get_by_name(target_field)));
        let links = group(join_rows, &[target_field, source_field])?;
        if links.is_empty() {
            return Ok(Resolved::new());
        }

        let target = descriptor.target();
        let target_pk = descriptor.target_field();
        let target_adapter = self.adapters.get(&target.adapter)?;
        let target_query = SelectQuery::new(&target.resource).order_by(descriptor.order_by().to_vec());
        let target_rows = self.select_in(target_adapter, target_query, target_pk, &target_values, round_trips)?;

        let mut order: Vec<KeyValue> = Vec::with_capacity(target_rows.len());
        for row in &target_rows {
            if let Some(key) = row.get_by_name(target_pk).and_then(Value::to_key) {
                if !order.contains(&key) {
                    order.push(key);
                }
            }
        }
        let targets = index_by(target_rows, target_pk)?;

        let missing: Vec<String> = links
            .keys()
            .filter(|key| !targets.contains_key(key))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                association = %descriptor.property(),
                join_resource = join_resource,
                missing = missing.len(),
                "Join resource references missing target rows"
            );
            return Err(JoinIntegrityError {
                association: descriptor.property().to_string(),
                join_resource: join_resource.to_string(),
                target_resource: target.resource.clone(),
                missing_keys: missing,
            }
            .into());
        }

        // Invert (target, source) links into source -> targets, in target order.
        let mut by_source: BTreeMap<KeyValue, Vec<Row>> = BTreeMap::new();
        for target_key in &order {
            let (Some(Grouped::Group(sources)), Some(row)) = (links.get(target_key), targets.get(target_key))
            else {
                continue;
            };
            for source_key in sources.keys() {
                by_source
                    .entry(source_key.clone())
                    .or_default()
                    .push(row.clone());
            }
        }
        Ok(by_source
            .into_iter()
            .map(|(key, rows)| (key, Relation::Many(rows)))
            .collect())
    }

    /// Run `query` with `field IN values`, chunked per configuration.
    fn select_in(
        &self,
        adapter: &dyn Adapter,
        query: SelectQuery,
        field: &str,
        values: &[Value],
        round_trips: &mut usize,
    ) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        for chunk in values.chunks(self.config.chunk_size(values.len())) {
            let chunk_query = query.clone().filter(col(field).in_list(chunk.iter().cloned()));
            tracing::trace!(
                adapter = adapter.name(),
                resource = %chunk_query.resource,
                field = field,
                values = chunk.len(),
                "Relation select"
            );
            rows.extend(adapter.select(&chunk_query)?);
            *round_trips += 1;
        }
        Ok(rows)
    }
}
