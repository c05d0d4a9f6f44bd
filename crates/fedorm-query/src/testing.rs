//! Recording adapter for unit tests.

use fedorm_core::error::{AdapterError, AdapterErrorKind, Result};
use fedorm_core::{Adapter, Filter, Row, SelectQuery, Value, sort_rows};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// One adapter call as seen by the store.
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub op: &'static str,
    pub resource: String,
    pub query: Option<SelectQuery>,
}

/// In-memory tables that log every call made against them.
pub(crate) struct RecordingAdapter {
    name: String,
    tables: Mutex<BTreeMap<String, Vec<Row>>>,
    calls: Mutex<Vec<Recorded>>,
    failing: Mutex<Option<String>>,
}

impl RecordingAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tables: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(None),
        }
    }

    pub fn with_rows(self, resource: &str, rows: Vec<Row>) -> Self {
        self.tables
            .lock()
            .unwrap()
            .insert(resource.to_string(), rows);
        self
    }

    /// Make every call against `resource` fail.
    pub fn fail_on(&self, resource: &str) {
        *self.failing.lock().unwrap() = Some(resource.to_string());
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, op: &'static str, resource: &str, query: Option<SelectQuery>) -> Result<()> {
        self.calls.lock().unwrap().push(Recorded {
            op,
            resource: resource.to_string(),
            query,
        });
        if self.failing.lock().unwrap().as_deref() == Some(resource) {
            return Err(AdapterError::new(&self.name, AdapterErrorKind::Timeout, "store timed out").into());
        }
        Ok(())
    }
}

impl Adapter for RecordingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        self.record("select", &query.resource, Some(query.clone()))?;
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<Row> = tables
            .get(&query.resource)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filter.as_ref().is_none_or(|f| f.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_rows(&mut rows, &query.order_by);
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| {
                if query.fields.is_empty() {
                    row
                } else {
                    row.project(&query.fields)
                }
            })
            .collect())
    }

    fn insert(&self, resource: &str, values: &Row) -> Result<Option<Value>> {
        self.record("insert", resource, None)?;
        self.tables
            .lock()
            .unwrap()
            .entry(resource.to_string())
            .or_default()
            .push(values.clone());
        Ok(values.get_by_name("id").cloned())
    }

    fn update(&self, resource: &str, _filter: &Filter, _values: &Row) -> Result<u64> {
        self.record("update", resource, None)?;
        Ok(0)
    }

    fn delete(&self, resource: &str, _filter: &Filter) -> Result<u64> {
        self.record("delete", resource, None)?;
        Ok(0)
    }
}
