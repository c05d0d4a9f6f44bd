//! Pending relationship mutations.
//!
//! A [`ChangeTracker`] belongs to one loaded collection or single-valued slot
//! of one source row. It accumulates attach/detach/add/remove requests until a
//! [`PersistenceCoordinator`](crate::PersistenceCoordinator) replays them.
//!
//! Collections (OneToMany, ManyToMany) keep four ordered sets. Single-valued
//! relations (ManyToOne, OneToOne) keep only the most recent request.

use fedorm_core::error::{Error, InvalidChangeKind, Result};
use fedorm_core::{AssociationDescriptor, AssociationKind, KeyValue, Row, Value};

/// Insertion-ordered set of key values.
#[derive(Debug, Clone, Default, PartialEq)]
struct KeySet {
    values: Vec<Value>,
    keys: Vec<KeyValue>,
}

impl KeySet {
    /// Returns `false` if the key was already present.
    fn insert(&mut self, key: KeyValue, value: Value) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.push(key);
        self.values.push(value);
        true
    }

    fn remove(&mut self, key: &KeyValue) -> bool {
        match self.keys.iter().position(|k| k == key) {
            Some(index) => {
                self.keys.remove(index);
                self.values.remove(index);
                true
            }
            None => false,
        }
    }

    fn contains(&self, key: &KeyValue) -> bool {
        self.keys.contains(key)
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}

/// The pending change of a single-valued relation.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotChange {
    /// Point the source at an existing target.
    Attach(Value),
    /// Insert a new target and point the source at it.
    Add(Row),
    /// Delete the target and clear the source key.
    Remove(Value),
    /// Clear the source key, leaving the target in place.
    Detach(Value),
}

#[derive(Debug, Clone, PartialEq)]
enum Pending {
    Collection {
        attached: KeySet,
        detached: KeySet,
        added: Vec<Row>,
        removed: KeySet,
    },
    Slot(Option<SlotChange>),
}

/// Accumulates relationship mutations for one association of one source row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeTracker {
    association: String,
    kind: AssociationKind,
    /// Target primary key; `add` payloads must not carry it.
    target_pk: Option<String>,
    /// Target field a key refers to; `None` when the target cannot be keyed.
    key_field: Option<String>,
    pending: Pending,
}

impl ChangeTracker {
    /// Create an empty tracker shaped for `descriptor`.
    pub fn new(descriptor: &AssociationDescriptor) -> Self {
        let target_pk = descriptor.target().primary_key.clone();
        let key_field = match descriptor.kind() {
            AssociationKind::OneToOne | AssociationKind::ManyToOne => {
                Some(descriptor.target_field().to_string())
            }
            AssociationKind::OneToMany | AssociationKind::ManyToMany => target_pk.clone(),
        };
        let pending = if descriptor.is_collection() {
            Pending::Collection {
                attached: KeySet::default(),
                detached: KeySet::default(),
                added: Vec::new(),
                removed: KeySet::default(),
            }
        } else {
            Pending::Slot(None)
        };
        Self {
            association: descriptor.property().to_string(),
            kind: descriptor.kind(),
            target_pk,
            key_field,
            pending,
        }
    }

    pub fn association(&self) -> &str {
        &self.association
    }

    pub const fn kind(&self) -> AssociationKind {
        self.kind
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.pending, Pending::Collection { .. })
    }

    fn error(&self, kind: InvalidChangeKind, message: impl Into<String>) -> Error {
        Error::invalid_change(kind, &self.association, message)
    }

    fn key_of(&self, op: &str, key: &Value) -> Result<KeyValue> {
        if self.key_field.is_none() {
            return Err(self.error(
                InvalidChangeKind::MissingKey,
                format!("cannot {} by key: target has no primary key", op),
            ));
        }
        key.to_key().ok_or_else(|| {
            self.error(
                InvalidChangeKind::MissingKey,
                format!("cannot {} an empty key", op),
            )
        })
    }

    /// Link an existing target.
    pub fn attach(&mut self, key: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let k = self.key_of("attach", &key)?;
        tracing::trace!(association = %self.association, key = %k, "Tracking attach");
        match &mut self.pending {
            Pending::Collection {
                attached, detached, ..
            } => {
                detached.remove(&k);
                attached.insert(k, key);
            }
            Pending::Slot(slot) => *slot = Some(SlotChange::Attach(key)),
        }
        Ok(())
    }

    /// Unlink a target without deleting it.
    pub fn detach(&mut self, key: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let k = self.key_of("detach", &key)?;
        tracing::trace!(association = %self.association, key = %k, "Tracking detach");
        match &mut self.pending {
            Pending::Collection {
                attached, detached, ..
            } => {
                attached.remove(&k);
                detached.insert(k, key);
            }
            Pending::Slot(slot) => *slot = Some(SlotChange::Detach(key)),
        }
        Ok(())
    }

    /// Insert a new target and link it. The payload must not carry a primary key.
    pub fn add(&mut self, payload: Row) -> Result<()> {
        if let Some(pk) = &self.target_pk {
            if payload.get_by_name(pk).is_some_and(|v| !v.is_empty_key()) {
                return Err(self.error(
                    InvalidChangeKind::UnexpectedKey,
                    format!("payload passed to add already has primary key '{}'", pk),
                ));
            }
        }
        tracing::trace!(association = %self.association, fields = payload.len(), "Tracking add");
        match &mut self.pending {
            Pending::Collection { added, .. } => added.push(payload),
            Pending::Slot(slot) => *slot = Some(SlotChange::Add(payload)),
        }
        Ok(())
    }

    /// Delete a target and unlink it.
    pub fn remove(&mut self, key: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let k = self.key_of("remove", &key)?;
        tracing::trace!(association = %self.association, key = %k, "Tracking remove");
        match &mut self.pending {
            Pending::Collection {
                attached,
                detached,
                removed,
                ..
            } => {
                attached.remove(&k);
                detached.remove(&k);
                removed.insert(k, key);
            }
            Pending::Slot(slot) => *slot = Some(SlotChange::Remove(key)),
        }
        Ok(())
    }

    /// Key of a whole target row, as `attach`/`detach`/`remove` expect it.
    fn row_key(&self, op: &str, row: &Row) -> Result<Value> {
        let Some(field) = &self.key_field else {
            return Err(self.error(
                InvalidChangeKind::MissingKey,
                format!("cannot {} a row: target has no primary key", op),
            ));
        };
        row.get_by_name(field)
            .filter(|v| !v.is_empty_key())
            .cloned()
            .ok_or_else(|| {
                self.error(
                    InvalidChangeKind::MissingKey,
                    format!("cannot {} a row without a value for '{}'", op, field),
                )
            })
    }

    pub fn attach_row(&mut self, row: &Row) -> Result<()> {
        let key = self.row_key("attach", row)?;
        self.attach(key)
    }

    pub fn detach_row(&mut self, row: &Row) -> Result<()> {
        let key = self.row_key("detach", row)?;
        self.detach(key)
    }

    pub fn remove_row(&mut self, row: &Row) -> Result<()> {
        let key = self.row_key("remove", row)?;
        self.remove(key)
    }

    /// Keys pending attach, in call order. Empty for single-valued relations.
    pub fn attached(&self) -> &[Value] {
        match &self.pending {
            Pending::Collection { attached, .. } => &attached.values,
            Pending::Slot(_) => &[],
        }
    }

    pub fn detached(&self) -> &[Value] {
        match &self.pending {
            Pending::Collection { detached, .. } => &detached.values,
            Pending::Slot(_) => &[],
        }
    }

    pub fn added(&self) -> &[Row] {
        match &self.pending {
            Pending::Collection { added, .. } => added,
            Pending::Slot(_) => &[],
        }
    }

    pub fn removed(&self) -> &[Value] {
        match &self.pending {
            Pending::Collection { removed, .. } => &removed.values,
            Pending::Slot(_) => &[],
        }
    }

    /// The pending change of a single-valued relation.
    pub fn slot(&self) -> Option<&SlotChange> {
        match &self.pending {
            Pending::Slot(slot) => slot.as_ref(),
            Pending::Collection { .. } => None,
        }
    }

    /// Whether `key` is pending attach.
    pub fn is_attached(&self, key: &Value) -> bool {
        match (&self.pending, key.to_key()) {
            (Pending::Collection { attached, .. }, Some(k)) => attached.contains(&k),
            _ => false,
        }
    }

    /// Number of pending operations.
    pub fn len(&self) -> usize {
        match &self.pending {
            Pending::Collection {
                attached,
                detached,
                added,
                removed,
            } => attached.len() + detached.len() + added.len() + removed.len(),
            Pending::Slot(slot) => usize::from(slot.is_some()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every pending operation.
    pub fn clear(&mut self) {
        match &mut self.pending {
            Pending::Collection {
                attached,
                detached,
                added,
                removed,
            } => {
                *attached = KeySet::default();
                *detached = KeySet::default();
                added.clear();
                *removed = KeySet::default();
            }
            Pending::Slot(slot) => *slot = None,
        }
    }
}
