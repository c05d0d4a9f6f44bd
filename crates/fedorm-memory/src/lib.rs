//! In-process reference adapter for fedorm.
//!
//! `MemoryAdapter` keeps named tables of rows behind a mutex and implements
//! the whole adapter contract: filtering through [`Filter::matches`],
//! ordering, paging, projection, generated integer keys, and embedding of
//! same-adapter associations passed as hints. It also logs every call and can
//! be told to fail on a resource, which makes it the store of choice for
//! exercising cross-adapter behaviour in tests.

use fedorm_core::error::{AdapterError, AdapterErrorKind, Error, Result};
use fedorm_core::{
    Adapter, AssociationDescriptor, AssociationKind, Filter, KeyValue, LinkRequest, Relation, Row,
    SelectQuery, Value, sort_rows,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// One call made against a [`MemoryAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub op: &'static str,
    pub resource: String,
}

#[derive(Debug)]
struct Table {
    rows: Vec<Row>,
    /// Field that receives generated keys.
    key_field: Option<String>,
    next_key: i64,
}

impl Table {
    fn with_key(key_field: Option<String>) -> Self {
        Self {
            rows: Vec::new(),
            key_field,
            next_key: 1,
        }
    }

    /// Store a row, generating a key if the table has a key field the row leaves empty.
    fn insert(&mut self, mut row: Row) -> Option<Value> {
        let Some(field) = self.key_field.clone() else {
            self.rows.push(row);
            return None;
        };
        let key = match row.get_by_name(&field) {
            Some(existing) if !existing.is_empty_key() => {
                if let Some(n) = existing.as_i64() {
                    self.next_key = self.next_key.max(n + 1);
                }
                existing.clone()
            }
            _ => {
                let generated = Value::BigInt(self.next_key);
                self.next_key += 1;
                row.set(field, generated.clone());
                generated
            }
        };
        self.rows.push(row);
        Some(key)
    }
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    calls: Vec<CallRecord>,
    failing: BTreeMap<String, AdapterErrorKind>,
}

/// An adapter over in-process tables.
#[derive(Debug)]
pub struct MemoryAdapter {
    name: String,
    state: Mutex<State>,
}

impl MemoryAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| {
            Error::Adapter(AdapterError::new(
                &self.name,
                AdapterErrorKind::Other,
                "memory adapter state is poisoned",
            ))
        })
    }

    /// Create (or reset) a table. `key_field` receives generated keys on insert.
    pub fn create_table(&self, resource: &str, key_field: Option<&str>) -> Result<()> {
        let mut state = self.state()?;
        state
            .tables
            .insert(resource.to_string(), Table::with_key(key_field.map(String::from)));
        tracing::debug!(adapter = %self.name, resource = resource, "Created table");
        Ok(())
    }

    /// Builder form of [`MemoryAdapter::create_table`] followed by seeding rows.
    pub fn with_table(self, resource: &str, key_field: Option<&str>, rows: Vec<Row>) -> Result<Self> {
        self.create_table(resource, key_field)?;
        self.seed(resource, rows)?;
        Ok(self)
    }

    /// Store rows without logging calls or checking failures.
    pub fn seed(&self, resource: &str, rows: Vec<Row>) -> Result<()> {
        let mut state = self.state()?;
        let table = state
            .tables
            .entry(resource.to_string())
            .or_insert_with(|| Table::with_key(None));
        for row in rows {
            table.insert(row);
        }
        Ok(())
    }

    /// Seed rows from a JSON array of flat objects.
    pub fn seed_json(&self, resource: &str, json: &str) -> Result<()> {
        let document: serde_json::Value = serde_json::from_str(json)?;
        let serde_json::Value::Array(items) = document else {
            return Err(Error::Custom(format!(
                "seed data for '{}' must be a JSON array",
                resource
            )));
        };
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let serde_json::Value::Object(fields) = item else {
                return Err(Error::Custom(format!(
                    "seed rows for '{}' must be JSON objects",
                    resource
                )));
            };
            rows.push(Row::from_pairs(
                fields.into_iter().map(|(k, v)| (k, value_from_json(v))),
            ));
        }
        self.seed(resource, rows)
    }

    /// Snapshot of a table's rows, in storage order.
    pub fn rows(&self, resource: &str) -> Result<Vec<Row>> {
        let state = self.state()?;
        Ok(state
            .tables
            .get(resource)
            .map(|t| t.rows.clone())
            .unwrap_or_default())
    }

    /// Make every subsequent call against `resource` fail with `kind`.
    pub fn fail_on(&self, resource: &str, kind: AdapterErrorKind) -> Result<()> {
        self.state()?.failing.insert(resource.to_string(), kind);
        Ok(())
    }

    pub fn clear_failures(&self) -> Result<()> {
        self.state()?.failing.clear();
        Ok(())
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Result<Vec<CallRecord>> {
        Ok(self.state()?.calls.clone())
    }

    pub fn call_count(&self) -> Result<usize> {
        Ok(self.state()?.calls.len())
    }

    pub fn reset_calls(&self) -> Result<()> {
        self.state()?.calls.clear();
        Ok(())
    }

    /// Log a call and apply any configured failure.
    fn enter(&self, state: &mut State, op: &'static str, resource: &str) -> Result<()> {
        state.calls.push(CallRecord {
            op,
            resource: resource.to_string(),
        });
        tracing::trace!(adapter = %self.name, op = op, resource = resource, "Memory adapter call");
        if let Some(kind) = state.failing.get(resource) {
            return Err(AdapterError::new(
                &self.name,
                *kind,
                format!("{} on '{}' failed", op, resource),
            )
            .into());
        }
        Ok(())
    }

    fn not_found(&self, resource: &str) -> Error {
        AdapterError::new(
            &self.name,
            AdapterErrorKind::ResourceNotFound,
            format!("no table named '{}'", resource),
        )
        .into()
    }

    /// Resolve a hinted association for `row` against local tables.
    fn embedded(&self, state: &State, hint: &AssociationDescriptor, row: &Row) -> Result<Option<Relation>> {
        let target = hint.target();
        let table = state
            .tables
            .get(&target.resource)
            .ok_or_else(|| self.not_found(&target.resource))?;
        let Some(key) = hint
            .correlation_field()
            .and_then(|field| row.get_by_name(field))
            .and_then(Value::to_key)
        else {
            return Ok(None);
        };
        let relation = match hint.kind() {
            AssociationKind::OneToOne | AssociationKind::ManyToOne => table
                .rows
                .iter()
                .rfind(|r| field_is(r, hint.target_field(), &key))
                .cloned()
                .map(Relation::One),
            AssociationKind::OneToMany => {
                let mut related: Vec<Row> = table
                    .rows
                    .iter()
                    .filter(|r| field_is(r, hint.target_field(), &key))
                    .cloned()
                    .collect();
                sort_rows(&mut related, hint.order_by());
                (!related.is_empty()).then_some(Relation::Many(related))
            }
            AssociationKind::ManyToMany => {
                let (Some(join_resource), Some(source_field), Some(target_field)) = (
                    hint.join_resource(),
                    hint.join_key_for_source(),
                    hint.join_key_for_target(),
                ) else {
                    return Ok(None);
                };
                let join = state
                    .tables
                    .get(join_resource)
                    .ok_or_else(|| self.not_found(join_resource))?;
                let linked: Vec<KeyValue> = join
                    .rows
                    .iter()
                    .filter(|r| field_is(r, source_field, &key))
                    .filter_map(|r| r.get_by_name(target_field).and_then(Value::to_key))
                    .collect();
                let mut related: Vec<Row> = table
                    .rows
                    .iter()
                    .filter(|r| linked.iter().any(|k| field_is(r, hint.target_field(), k)))
                    .cloned()
                    .collect();
                sort_rows(&mut related, hint.order_by());
                (!related.is_empty()).then_some(Relation::Many(related))
            }
        };
        Ok(relation)
    }
}

fn field_is(row: &Row, field: &str, key: &KeyValue) -> bool {
    row.get_by_name(field).and_then(Value::to_key).as_ref() == Some(key)
}

/// Map a JSON scalar onto the closest `Value`; arrays and objects stay JSON.
fn value_from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::BigInt(i),
            None => n.as_f64().map_or(Value::Null, Value::Double),
        },
        serde_json::Value::String(s) => Value::Text(s),
        other => Value::Json(other),
    }
}

fn apply(row: &mut Row, values: &Row) {
    for (name, value) in values.iter() {
        row.set(name, value.clone());
    }
}

impl Adapter for MemoryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        let mut state = self.state()?;
        self.enter(&mut state, "select", &query.resource)?;
        let table = state
            .tables
            .get(&query.resource)
            .ok_or_else(|| self.not_found(&query.resource))?;

        let mut rows: Vec<Row> = table
            .rows
            .iter()
            .filter(|row| query.filter.as_ref().is_none_or(|f| f.matches(row)))
            .cloned()
            .collect();
        sort_rows(&mut rows, &query.order_by);
        let offset = usize::try_from(query.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        let mut out = Vec::new();
        for mut row in rows.into_iter().skip(offset).take(limit) {
            for hint in &query.hints {
                if let Some(relation) = self.embedded(&state, hint, &row)? {
                    row.set_relation(hint.property(), relation);
                }
            }
            if !query.fields.is_empty() {
                row = row.project(&query.fields);
            }
            out.push(row);
        }
        Ok(out)
    }

    fn insert(&self, resource: &str, values: &Row) -> Result<Option<Value>> {
        let mut state = self.state()?;
        self.enter(&mut state, "insert", resource)?;
        let table = state
            .tables
            .entry(resource.to_string())
            .or_insert_with(|| Table::with_key(None));
        Ok(table.insert(values.clone()))
    }

    fn update(&self, resource: &str, filter: &Filter, values: &Row) -> Result<u64> {
        let mut state = self.state()?;
        self.enter(&mut state, "update", resource)?;
        let table = state
            .tables
            .get_mut(resource)
            .ok_or_else(|| self.not_found(resource))?;
        let mut affected = 0;
        for row in table.rows.iter_mut().filter(|row| filter.matches(row)) {
            apply(row, values);
            affected += 1;
        }
        Ok(affected)
    }

    fn delete(&self, resource: &str, filter: &Filter) -> Result<u64> {
        let mut state = self.state()?;
        self.enter(&mut state, "delete", resource)?;
        let table = state
            .tables
            .get_mut(resource)
            .ok_or_else(|| self.not_found(resource))?;
        let before = table.rows.len();
        table.rows.retain(|row| !filter.matches(row));
        Ok((before - table.rows.len()) as u64)
    }

    fn link_many_to_many(&self, link: &LinkRequest) -> Result<u64> {
        let mut state = self.state()?;
        self.enter(&mut state, "link", &link.join_resource)?;
        let table = state
            .tables
            .entry(link.join_resource.clone())
            .or_insert_with(|| Table::with_key(None));
        let mut linked = 0;
        for row in link.join_rows() {
            // Existing links are left alone.
            if !table.rows.iter().any(|existing| link_matches(existing, &row)) {
                table.insert(row);
                linked += 1;
            }
        }
        Ok(linked)
    }

    fn unlink_many_to_many(&self, link: &LinkRequest) -> Result<u64> {
        let mut state = self.state()?;
        self.enter(&mut state, "unlink", &link.join_resource)?;
        let Some(table) = state.tables.get_mut(&link.join_resource) else {
            return Ok(0);
        };
        let filter = link.filter();
        let before = table.rows.len();
        table.rows.retain(|row| !filter.matches(row));
        Ok((before - table.rows.len()) as u64)
    }
}

/// Whether two join rows carry the same field values.
fn link_matches(existing: &Row, candidate: &Row) -> bool {
    candidate.iter().all(|(name, value)| {
        existing
            .get_by_name(name)
            .is_some_and(|v| v.loosely_equals(value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedorm_core::{DefinitionTokens, EntityMeta, OrderBy, SelectOne, col};
    use std::sync::Arc;

    fn store() -> MemoryAdapter {
        let store = MemoryAdapter::new("mem");
        store.create_table("heroes", Some("id")).unwrap();
        store
            .seed_json(
                "heroes",
                r#"[
                    {"id": 1, "name": "Deadpond", "age": null, "team_id": 1},
                    {"id": 2, "name": "Spider-Boy", "age": 16, "team_id": 2},
                    {"id": 3, "name": "Rusty-Man", "age": 48, "team_id": 1}
                ]"#,
            )
            .unwrap();
        store
    }

    fn names(rows: &[Row]) -> Vec<&str> {
        rows.iter()
            .filter_map(|r| r.get_by_name("name").and_then(Value::as_str))
            .collect()
    }

    #[test]
    fn select_filters_orders_pages_and_projects() {
        let store = store();
        let query = SelectQuery::new("heroes")
            .filter(col("team_id").eq(1))
            .order_by(vec![OrderBy::desc("age")])
            .fields(["name"]);
        let rows = store.select(&query).unwrap();
        // NULL sorts first when descending.
        assert_eq!(names(&rows), vec!["Deadpond", "Rusty-Man"]);
        assert!(!rows[0].contains_column("id"));

        let page = store
            .select(&SelectQuery::new("heroes").limit(1).offset(1))
            .unwrap();
        assert_eq!(names(&page), vec!["Spider-Boy"]);

        let like = store
            .select(&SelectQuery::new("heroes").filter(col("name").like("%-%")))
            .unwrap();
        assert_eq!(names(&like), vec!["Spider-Boy", "Rusty-Man"]);
    }

    #[test]
    fn insert_generates_keys_after_existing_ones() {
        let store = store();
        let key = store
            .insert("heroes", &Row::from_pairs([("name", "Tarantula")]))
            .unwrap();
        assert_eq!(key, Some(Value::BigInt(4)));
        let row = store
            .select_one(&SelectOne::new("heroes", "id", 4_i64))
            .unwrap()
            .unwrap();
        assert_eq!(row.get_by_name("name"), Some(&Value::from("Tarantula")));

        // Tables without a key field report no generated key.
        assert_eq!(
            store
                .insert("audit", &Row::from_pairs([("event", "x")]))
                .unwrap(),
            None
        );
    }

    #[test]
    fn update_and_delete_report_affected_rows() {
        let store = store();
        let n = store
            .update(
                "heroes",
                &col("team_id").eq(1),
                &Row::from_pairs([("team_id", Value::Null)]),
            )
            .unwrap();
        assert_eq!(n, 2);
        assert!(
            store
                .update_one("heroes", "id", &Value::Int(2), &Row::from_pairs([("age", 17)]))
                .unwrap()
        );
        assert_eq!(store.delete("heroes", &col("team_id").is_null()).unwrap(), 2);
        assert_eq!(store.rows("heroes").unwrap().len(), 1);
        assert!(!store.delete_one("heroes", "id", &Value::Int(1)).unwrap());
    }

    #[test]
    fn link_is_idempotent_and_unlink_removes() {
        let store = MemoryAdapter::new("mem");
        let link = LinkRequest {
            join_resource: "hero_powers".to_string(),
            join_key_for_source: "hero_id".to_string(),
            join_key_for_target: "power_id".to_string(),
            source_key: Value::Int(1),
            target_keys: vec![Value::Int(10), Value::Int(11)],
        };
        assert_eq!(store.link_many_to_many(&link).unwrap(), 2);
        assert_eq!(store.link_many_to_many(&link).unwrap(), 0);
        let unlink = LinkRequest {
            target_keys: vec![Value::Int(11)],
            ..link
        };
        assert_eq!(store.unlink_many_to_many(&unlink).unwrap(), 1);
        assert_eq!(store.rows("hero_powers").unwrap().len(), 1);
    }

    #[test]
    fn hints_embed_local_associations() {
        let store = store()
            .with_table(
                "teams",
                Some("id"),
                vec![
                    Row::from_pairs([("id", Value::Int(1)), ("name", Value::from("Preventers"))]),
                    Row::from_pairs([("id", Value::Int(2)), ("name", Value::from("Z-Force"))]),
                ],
            )
            .unwrap();
        let hero = EntityMeta::new("Hero", "mem", "heroes")
            .primary_key("id")
            .fields(["name", "team_id"]);
        let team = EntityMeta::new("Team", "mem", "teams")
            .primary_key("id")
            .field("name");
        let team_of_hero = Arc::new(
            AssociationDescriptor::create(
                AssociationKind::ManyToOne,
                "team",
                &hero,
                &team,
                DefinitionTokens::new().referencing_key("team_id"),
                false,
            )
            .unwrap(),
        );
        let heroes_of_team = Arc::new(
            AssociationDescriptor::create(
                AssociationKind::OneToMany,
                "heroes",
                &team,
                &hero,
                DefinitionTokens::new()
                    .referenced_key("team_id")
                    .order_by(OrderBy::desc("id")),
                false,
            )
            .unwrap(),
        );

        let rows = store
            .select(
                &SelectQuery::new("heroes")
                    .fields(["name"])
                    .hints(vec![team_of_hero]),
            )
            .unwrap();
        let team = rows[1].relation("team").unwrap().as_one().unwrap();
        assert_eq!(team.get_by_name("name"), Some(&Value::from("Z-Force")));

        let teams = store
            .select(&SelectQuery::new("teams").hints(vec![heroes_of_team]))
            .unwrap();
        let members = teams[0].relation("heroes").unwrap().as_many().unwrap();
        assert_eq!(names(members), vec!["Rusty-Man", "Deadpond"]);
    }

    #[test]
    fn failures_and_call_log() {
        let store = store();
        store
            .fail_on("heroes", AdapterErrorKind::Timeout)
            .unwrap();
        let err = store.select(&SelectQuery::new("heroes")).unwrap_err();
        assert!(err.is_retryable());
        store.clear_failures().unwrap();
        store.select(&SelectQuery::new("heroes")).unwrap();

        let calls = store.calls().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].op, "select");

        let err = store.select(&SelectQuery::new("villains")).unwrap_err();
        match err {
            Error::Adapter(e) => assert_eq!(e.kind, AdapterErrorKind::ResourceNotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn seed_json_rejects_non_arrays() {
        let store = MemoryAdapter::new("mem");
        assert!(store.seed_json("x", r#"{"id": 1}"#).is_err());
        assert!(store.seed_json("x", "[1, 2]").is_err());
        assert!(store.seed_json("x", "not json").is_err());
    }
}
