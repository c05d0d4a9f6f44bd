//! Replaying tracked relationship changes against adapters.
//!
//! [`PersistenceCoordinator::save`] turns a [`ChangeTracker`] into adapter
//! calls in two fixed phases:
//!
//! 1. add/attach: inserts, key updates, `link_many_to_many`
//! 2. remove/detach: deletes, key clears, `unlink_many_to_many`
//!
//! Calls run sequentially. The first failure aborts the remaining calls and
//! is returned as is; calls already made are not undone, since stores on
//! different adapters share no transaction.

use crate::change_tracker::{ChangeTracker, SlotChange};
use fedorm_core::error::{
    AdapterError, AdapterErrorKind, AssociationConfigError, Error, InvalidChangeKind, Result,
};
use fedorm_core::{
    Adapter, AdapterRegistry, AssociationDescriptor, AssociationKind, KeyValue, LinkRequest, Row,
    Value, col,
};

/// Counts of adapter-side effects of one save.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SaveSummary {
    /// Number of target rows inserted.
    pub inserted: u64,
    /// Number of rows whose keys were updated.
    pub updated: u64,
    /// Number of target rows deleted.
    pub deleted: u64,
    /// Number of join rows created.
    pub linked: u64,
    /// Number of join rows removed.
    pub unlinked: u64,
    /// Keys of inserted targets, in insert order.
    pub generated_keys: Vec<Value>,
}

impl SaveSummary {
    /// Create a new empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of affected rows.
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.deleted + self.linked + self.unlinked
    }
}

/// Replays change trackers into adapter calls.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceCoordinator<'a> {
    adapters: &'a AdapterRegistry,
}

/// State shared by the calls of one save.
///
/// The source adapter is looked up only when a referencing key is written, so
/// collection saves work with just the target and join adapters registered.
struct SaveContext<'a> {
    descriptor: &'a AssociationDescriptor,
    source_key: &'a Value,
    adapters: &'a AdapterRegistry,
    target: &'a dyn Adapter,
}

impl SaveContext<'_> {
    fn source(&self) -> Result<&dyn Adapter> {
        self.adapters.get(&self.descriptor.source().adapter)
    }
}

impl<'a> PersistenceCoordinator<'a> {
    pub fn new(adapters: &'a AdapterRegistry) -> Self {
        Self { adapters }
    }

    /// Persist the changes in `tracker` for the source row keyed by `source_key`.
    #[tracing::instrument(
        level = "debug",
        skip(self, descriptor, source_key, tracker),
        fields(association = %descriptor.property(), kind = %descriptor.kind())
    )]
    pub fn save(
        &self,
        descriptor: &AssociationDescriptor,
        source_key: &Value,
        tracker: &ChangeTracker,
    ) -> Result<SaveSummary> {
        if tracker.is_collection() != descriptor.is_collection() {
            return Err(Error::invalid_change(
                InvalidChangeKind::CardinalityMismatch,
                descriptor.property(),
                format!(
                    "{} tracker cannot be saved against a {} association",
                    tracker.kind(),
                    descriptor.kind()
                ),
            ));
        }
        if source_key.is_empty_key() {
            return Err(Error::invalid_change(
                InvalidChangeKind::MissingKey,
                descriptor.property(),
                "source row has no persisted primary key",
            ));
        }

        let mut summary = SaveSummary::new();
        if tracker.is_empty() {
            return Ok(summary);
        }

        let ctx = SaveContext {
            descriptor,
            source_key,
            adapters: self.adapters,
            target: self.adapters.get(&descriptor.target().adapter)?,
        };

        match descriptor.kind() {
            AssociationKind::OneToOne | AssociationKind::ManyToOne => {
                if let Some(change) = tracker.slot() {
                    save_slot(&ctx, change, &mut summary)?;
                }
            }
            AssociationKind::OneToMany => save_one_to_many(&ctx, tracker, &mut summary)?,
            AssociationKind::ManyToMany => {
                let join = self.adapters.get(descriptor.join_adapter().unwrap_or_default())?;
                save_many_to_many(&ctx, join, tracker, &mut summary)?;
            }
        }

        tracing::info!(
            association = %descriptor.property(),
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            linked = summary.linked,
            unlinked = summary.unlinked,
            "Relationship changes saved"
        );
        Ok(summary)
    }
}

fn config_error(descriptor: &AssociationDescriptor, message: &str) -> Error {
    AssociationConfigError::new(message)
        .for_association(descriptor.property())
        .into()
}

/// Point the source's referencing key at `value` (NULL to clear it).
fn set_referencing_key(ctx: &SaveContext<'_>, value: Value, summary: &mut SaveSummary) -> Result<()> {
    let source = ctx.descriptor.source();
    let pk = source
        .primary_key
        .as_deref()
        .ok_or_else(|| config_error(ctx.descriptor, "source entity has no primary key to update by"))?;
    let field = ctx
        .descriptor
        .referencing_key()
        .ok_or_else(|| config_error(ctx.descriptor, "association has no referencing key"))?;
    tracing::trace!(resource = %source.resource, field = field, value = %value, "Updating referencing key");
    let values = Row::from_pairs([(field, value)]);
    if ctx.source()?.update_one(&source.resource, pk, ctx.source_key, &values)? {
        summary.updated += 1;
    }
    Ok(())
}

/// Insert a target payload and return the key a link or reference should use.
///
/// The key is the generated key when `key_field` is the target primary key,
/// falling back to a key carried in the payload.
fn insert_target(
    ctx: &SaveContext<'_>,
    payload: &Row,
    key_field: &str,
    summary: &mut SaveSummary,
) -> Result<Value> {
    let target = ctx.descriptor.target();
    let generated = ctx.target.insert(&target.resource, payload)?;
    summary.inserted += 1;

    let is_pk = target.primary_key.as_deref() == Some(key_field);
    let from_payload = || payload.get_by_name(key_field).filter(|v| !v.is_empty_key()).cloned();
    let key = if is_pk {
        generated.filter(|v| !v.is_empty_key()).or_else(from_payload)
    } else {
        from_payload()
    };
    let key = key.ok_or_else(|| {
        AdapterError::new(
            ctx.target.name(),
            AdapterErrorKind::MissingGeneratedKey,
            format!(
                "insert into '{}' returned no value for '{}'",
                target.resource, key_field
            ),
        )
    })?;
    summary.generated_keys.push(key.clone());
    Ok(key)
}

fn save_slot(ctx: &SaveContext<'_>, change: &SlotChange, summary: &mut SaveSummary) -> Result<()> {
    let target = ctx.descriptor.target();
    let key_field = ctx.descriptor.target_field();
    match change {
        // Phase 1
        SlotChange::Attach(key) => set_referencing_key(ctx, key.clone(), summary),
        SlotChange::Add(payload) => {
            let key = insert_target(ctx, payload, key_field, summary)?;
            set_referencing_key(ctx, key, summary)
        }
        // Phase 2
        SlotChange::Remove(key) => {
            if ctx.target.delete_one(&target.resource, key_field, key)? {
                summary.deleted += 1;
            }
            set_referencing_key(ctx, Value::Null, summary)
        }
        SlotChange::Detach(_) => set_referencing_key(ctx, Value::Null, summary),
    }
}

fn save_one_to_many(ctx: &SaveContext<'_>, tracker: &ChangeTracker, summary: &mut SaveSummary) -> Result<()> {
    let target = ctx.descriptor.target();
    let referenced = ctx
        .descriptor
        .referenced_key()
        .ok_or_else(|| config_error(ctx.descriptor, "association has no referenced key"))?;
    let target_pk = || {
        target
            .primary_key
            .as_deref()
            .ok_or_else(|| config_error(ctx.descriptor, "target entity has no primary key"))
    };

    // Phase 1: attach, then add.
    if !tracker.attached().is_empty() {
        let filter = col(target_pk()?).in_list(tracker.attached().iter().cloned());
        let values = Row::from_pairs([(referenced, ctx.source_key.clone())]);
        summary.updated += ctx.target.update(&target.resource, &filter, &values)?;
    }
    for payload in tracker.added() {
        let mut row = payload.clone();
        row.set(referenced, ctx.source_key.clone());
        let generated = ctx.target.insert(&target.resource, &row)?;
        summary.inserted += 1;
        if let Some(key) = generated {
            summary.generated_keys.push(key);
        }
    }

    // Phase 2: remove, then detach.
    if !tracker.removed().is_empty() {
        let filter = col(target_pk()?).in_list(tracker.removed().iter().cloned());
        summary.deleted += ctx.target.delete(&target.resource, &filter)?;
    }
    if !tracker.detached().is_empty() {
        let filter = col(target_pk()?).in_list(tracker.detached().iter().cloned());
        let values = Row::from_pairs([(referenced, Value::Null)]);
        summary.updated += ctx.target.update(&target.resource, &filter, &values)?;
    }
    Ok(())
}

/// Concatenate key lists, dropping later duplicates.
fn union_keys<'v>(lists: impl IntoIterator<Item = &'v Value>) -> Vec<Value> {
    let mut seen: Vec<KeyValue> = Vec::new();
    let mut out = Vec::new();
    for value in lists {
        if let Some(key) = value.to_key() {
            if !seen.contains(&key) {
                seen.push(key);
                out.push(value.clone());
            }
        }
    }
    out
}

fn save_many_to_many(
    ctx: &SaveContext<'_>,
    join: &dyn Adapter,
    tracker: &ChangeTracker,
    summary: &mut SaveSummary,
) -> Result<()> {
    let target = ctx.descriptor.target();
    let target_pk = ctx.descriptor.target_field();

    // Phase 1: insert added targets, then link them together with attached keys.
    let mut added_keys = Vec::with_capacity(tracker.added().len());
    for payload in tracker.added() {
        added_keys.push(insert_target(ctx, payload, target_pk, summary)?);
    }
    let link_keys = union_keys(added_keys.iter().chain(tracker.attached()));
    if !link_keys.is_empty() {
        let link = LinkRequest::for_association(ctx.descriptor, ctx.source_key.clone(), link_keys)?;
        tracing::trace!(join_resource = %link.join_resource, keys = link.target_keys.len(), "Linking");
        summary.linked += join.link_many_to_many(&link)?;
    }

    // Phase 2: delete removed targets, then unlink them together with detached keys.
    if !tracker.removed().is_empty() {
        let filter = col(target_pk).in_list(tracker.removed().iter().cloned());
        summary.deleted += ctx.target.delete(&target.resource, &filter)?;
    }
    let unlink_keys = union_keys(tracker.removed().iter().chain(tracker.detached()));
    if !unlink_keys.is_empty() {
        let link = LinkRequest::for_association(ctx.descriptor, ctx.source_key.clone(), unlink_keys)?;
        tracing::trace!(join_resource = %link.join_resource, keys = link.target_keys.len(), "Unlinking");
        summary.unlinked += join.unlink_many_to_many(&link)?;
    }
    Ok(())
}
