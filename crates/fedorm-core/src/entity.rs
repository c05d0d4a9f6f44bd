//! Entity metadata.
//!
//! An [`EntityMeta`] records where an entity lives (adapter and resource), its
//! primary key, its declared fields and the associations it exposes. Metadata
//! is built once, usually by a parser outside this crate, and shared through an
//! [`EntityRegistry`].

use crate::association::AssociationDescriptor;
use crate::error::{AssociationConfigError, Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A declared field of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: String,
    /// Computed fields are derived by the application and never selected.
    pub computed: bool,
}

/// The location and key of an entity, as seen by an association.
///
/// Descriptors hold handles rather than the full [`EntityMeta`] so that
/// metadata and descriptors do not reference each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityHandle {
    pub name: String,
    pub adapter: String,
    pub resource: String,
    pub primary_key: Option<String>,
}

impl EntityHandle {
    pub fn has_primary_key(&self) -> bool {
        self.primary_key.is_some()
    }
}

/// Full metadata for one entity.
#[derive(Debug, Clone)]
pub struct EntityMeta {
    name: String,
    adapter: String,
    resource: String,
    primary_key: Option<String>,
    fields: Vec<FieldMeta>,
    associations: BTreeMap<String, Arc<AssociationDescriptor>>,
}

impl EntityMeta {
    /// Start describing an entity stored in `resource` on `adapter`.
    pub fn new(
        name: impl Into<String>,
        adapter: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            adapter: adapter.into(),
            resource: resource.into(),
            primary_key: None,
            fields: Vec::new(),
            associations: BTreeMap::new(),
        }
    }

    /// Declare the primary key. The key is also registered as a field.
    #[must_use]
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.has_field(&field) {
            self.fields.insert(
                0,
                FieldMeta {
                    name: field.clone(),
                    computed: false,
                },
            );
        }
        self.primary_key = Some(field);
        self
    }

    /// Declare a stored field.
    #[must_use]
    pub fn field(self, name: impl Into<String>) -> Self {
        self.push_field(name.into(), false)
    }

    /// Declare several stored fields at once.
    #[must_use]
    pub fn fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self = self.push_field(name.into(), false);
        }
        self
    }

    /// Declare a computed field.
    #[must_use]
    pub fn computed_field(self, name: impl Into<String>) -> Self {
        self.push_field(name.into(), true)
    }

    fn push_field(mut self, name: String, computed: bool) -> Self {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == name) {
            existing.computed = computed;
        } else {
            self.fields.push(FieldMeta { name, computed });
        }
        self
    }

    /// Attach an association whose source is this entity.
    ///
    /// Fails when the descriptor belongs to another entity or the property
    /// name collides with a declared field.
    pub fn add_association(&mut self, descriptor: Arc<AssociationDescriptor>) -> Result<()> {
        let property = descriptor.property().to_string();
        if descriptor.source().name != self.name {
            return Err(AssociationConfigError::new(format!(
                "association source '{}' does not match entity '{}'",
                descriptor.source().name,
                self.name
            ))
            .for_association(property)
            .into());
        }
        if self.has_field(&property) {
            return Err(AssociationConfigError::new(format!(
                "property collides with a field of '{}'",
                self.name
            ))
            .for_association(property)
            .into());
        }
        self.associations.insert(property, descriptor);
        Ok(())
    }

    /// Builder form of [`EntityMeta::add_association`].
    pub fn with_association(mut self, descriptor: Arc<AssociationDescriptor>) -> Result<Self> {
        self.add_association(descriptor)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn has_primary_key(&self) -> bool {
        self.primary_key.is_some()
    }

    pub fn primary_key_field(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn declared_fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Names of every non-computed field, in declaration order.
    pub fn stored_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !f.computed)
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn association(&self, property: &str) -> Option<&Arc<AssociationDescriptor>> {
        self.associations.get(property)
    }

    pub fn associations(&self) -> impl Iterator<Item = &Arc<AssociationDescriptor>> {
        self.associations.values()
    }

    /// Snapshot used by descriptors.
    pub fn handle(&self) -> EntityHandle {
        EntityHandle {
            name: self.name.clone(),
            adapter: self.adapter.clone(),
            resource: self.resource.clone(),
            primary_key: self.primary_key.clone(),
        }
    }
}

impl From<&EntityMeta> for EntityHandle {
    fn from(meta: &EntityMeta) -> Self {
        meta.handle()
    }
}

/// Explicit registry of entity metadata, keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, Arc<EntityMeta>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity, replacing any previous entity of the same name.
    pub fn register(&mut self, meta: EntityMeta) -> Arc<EntityMeta> {
        let meta = Arc::new(meta);
        self.entities
            .insert(meta.name().to_string(), Arc::clone(&meta));
        meta
    }

    /// Look up an entity by name.
    pub fn get(&self, name: &str) -> Result<&Arc<EntityMeta>> {
        self.entities.get(name).ok_or_else(|| {
            Error::association_config(format!("entity '{}' is not registered", name))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
