//! Recording adapter for unit tests.

use fedorm_core::error::{AdapterError, AdapterErrorKind, Result};
use fedorm_core::{Adapter, Filter, LinkRequest, Row, SelectQuery, Value};
use std::sync::Mutex;

/// One write as seen by the store.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Select { resource: String },
    Insert { resource: String, values: Row },
    Update { resource: String, filter: Filter, values: Row },
    Delete { resource: String, filter: Filter },
    Link(LinkRequest),
    Unlink(LinkRequest),
}

impl Call {
    fn op(&self) -> &'static str {
        match self {
            Call::Select { .. } => "select",
            Call::Insert { .. } => "insert",
            Call::Update { .. } => "update",
            Call::Delete { .. } => "delete",
            Call::Link(_) => "link",
            Call::Unlink(_) => "unlink",
        }
    }

    fn resource(&self) -> &str {
        match self {
            Call::Select { resource }
            | Call::Insert { resource, .. }
            | Call::Update { resource, .. }
            | Call::Delete { resource, .. } => resource,
            Call::Link(link) | Call::Unlink(link) => &link.join_resource,
        }
    }
}

/// Logs every call; optionally generates keys and fails on one resource.
pub(crate) struct RecordingAdapter {
    name: String,
    calls: Mutex<Vec<Call>>,
    next_key: Mutex<Option<i64>>,
    failing: Mutex<Option<String>>,
}

impl RecordingAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Mutex::new(Vec::new()),
            next_key: Mutex::new(None),
            failing: Mutex::new(None),
        }
    }

    /// Make `insert` report generated keys starting at `first`.
    pub fn generate_keys_from(&self, first: i64) {
        *self.next_key.lock().unwrap() = Some(first);
    }

    pub fn fail_on(&self, resource: &str) {
        *self.failing.lock().unwrap() = Some(resource.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(Call::op).collect()
    }

    fn record(&self, call: Call) -> Result<()> {
        let fails = self.failing.lock().unwrap().as_deref() == Some(call.resource());
        self.calls.lock().unwrap().push(call);
        if fails {
            return Err(AdapterError::new(&self.name, AdapterErrorKind::Connection, "connection reset").into());
        }
        Ok(())
    }
}

impl Adapter for RecordingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        self.record(Call::Select {
            resource: query.resource.clone(),
        })?;
        Ok(Vec::new())
    }

    fn insert(&self, resource: &str, values: &Row) -> Result<Option<Value>> {
        self.record(Call::Insert {
            resource: resource.to_string(),
            values: values.clone(),
        })?;
        let mut next = self.next_key.lock().unwrap();
        Ok(next.as_mut().map(|key| {
            let generated = *key;
            *key += 1;
            Value::BigInt(generated)
        }))
    }

    fn update(&self, resource: &str, filter: &Filter, values: &Row) -> Result<u64> {
        self.record(Call::Update {
            resource: resource.to_string(),
            filter: filter.clone(),
            values: values.clone(),
        })?;
        Ok(1)
    }

    fn delete(&self, resource: &str, filter: &Filter) -> Result<u64> {
        self.record(Call::Delete {
            resource: resource.to_string(),
            filter: filter.clone(),
        })?;
        Ok(1)
    }

    fn link_many_to_many(&self, link: &LinkRequest) -> Result<u64> {
        self.record(Call::Link(link.clone()))?;
        Ok(link.target_keys.len() as u64)
    }

    fn unlink_many_to_many(&self, link: &LinkRequest) -> Result<u64> {
        self.record(Call::Unlink(link.clone()))?;
        Ok(link.target_keys.len() as u64)
    }
}
