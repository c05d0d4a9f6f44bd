//! Association descriptors.
//!
//! An [`AssociationDescriptor`] describes one declared relationship between a
//! source entity and a target entity. It is validated once by
//! [`AssociationDescriptor::create`], shared behind an `Arc`, and read by both
//! the resolver (read path) and the persistence coordinator (write path).

use crate::entity::EntityHandle;
use crate::error::{AssociationConfigError, Result};
use crate::order::OrderBy;
use std::fmt;

/// The kind of relationship between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    /// One source row owns a key pointing at one target row.
    OneToOne,
    /// One source row has many target rows carrying its key.
    OneToMany,
    /// Many source rows point at one target row.
    ManyToOne,
    /// Source and target rows are linked through a join resource.
    ManyToMany,
}

impl AssociationKind {
    /// Whether the association resolves to a sequence of rows.
    pub const fn is_collection(self) -> bool {
        matches!(self, AssociationKind::OneToMany | AssociationKind::ManyToMany)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            AssociationKind::OneToOne => "one_to_one",
            AssociationKind::OneToMany => "one_to_many",
            AssociationKind::ManyToOne => "many_to_one",
            AssociationKind::ManyToMany => "many_to_many",
        }
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw definition tokens, as a metadata parser would collect them.
#[derive(Debug, Clone, Default)]
pub struct DefinitionTokens {
    referencing_key: Option<String>,
    target_key: Option<String>,
    referenced_key: Option<String>,
    join_resource: Option<String>,
    join_key_for_source: Option<String>,
    join_key_for_target: Option<String>,
    order_by: Vec<OrderBy>,
}

impl DefinitionTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Foreign-key field on the source (OneToOne, ManyToOne).
    #[must_use]
    pub fn referencing_key(mut self, field: impl Into<String>) -> Self {
        self.referencing_key = Some(field.into());
        self
    }

    /// Target field matched by a OneToOne key. Defaults to the target primary key.
    #[must_use]
    pub fn target_key(mut self, field: impl Into<String>) -> Self {
        self.target_key = Some(field.into());
        self
    }

    /// Field on the target holding the source primary key (OneToMany).
    #[must_use]
    pub fn referenced_key(mut self, field: impl Into<String>) -> Self {
        self.referenced_key = Some(field.into());
        self
    }

    #[must_use]
    pub fn join_resource(mut self, resource: impl Into<String>) -> Self {
        self.join_resource = Some(resource.into());
        self
    }

    #[must_use]
    pub fn join_key_for_source(mut self, field: impl Into<String>) -> Self {
        self.join_key_for_source = Some(field.into());
        self
    }

    #[must_use]
    pub fn join_key_for_target(mut self, field: impl Into<String>) -> Self {
        self.join_key_for_target = Some(field.into());
        self
    }

    /// Default ordering of related rows (OneToMany, ManyToMany).
    #[must_use]
    pub fn order_by(mut self, term: OrderBy) -> Self {
        self.order_by.push(term);
        self
    }
}

/// Kind-specific key layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationKeys {
    /// OneToOne / ManyToOne: the key lives on the source.
    Referencing {
        referencing_key: String,
        target_key: String,
    },
    /// OneToMany: the key lives on the target.
    Referenced { referenced_key: String },
    /// ManyToMany: keys live in a join resource.
    Join {
        join_resource: String,
        join_key_for_source: String,
        join_key_for_target: String,
        dominant: bool,
    },
}

/// One declared relationship. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationDescriptor {
    kind: AssociationKind,
    property: String,
    source: EntityHandle,
    target: EntityHandle,
    keys: AssociationKeys,
    order_by: Vec<OrderBy>,
}

/// Take a token, treating an empty string as absent.
fn present(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

impl AssociationDescriptor {
    /// Validate definition tokens and build a descriptor.
    ///
    /// `dominant` selects which side's adapter holds the join resource of a
    /// ManyToMany and must be `false` for every other kind.
    pub fn create(
        kind: AssociationKind,
        property: impl Into<String>,
        source: impl Into<EntityHandle>,
        target: impl Into<EntityHandle>,
        tokens: DefinitionTokens,
        dominant: bool,
    ) -> Result<Self> {
        let property = property.into();
        let source = source.into();
        let target = target.into();
        let fail = |message: String| AssociationConfigError::new(message).for_association(&property);

        if property.is_empty() {
            return Err(AssociationConfigError::new("association property name is empty").into());
        }

        let DefinitionTokens {
            referencing_key,
            target_key,
            referenced_key,
            join_resource,
            join_key_for_source,
            join_key_for_target,
            order_by,
        } = tokens;
        let referencing_key = present(referencing_key);
        let target_key = present(target_key);
        let referenced_key = present(referenced_key);
        let join_resource = present(join_resource);
        let join_key_for_source = present(join_key_for_source);
        let join_key_for_target = present(join_key_for_target);

        // Tokens that belong to another kind make the definition ambiguous.
        let mut foreign = Vec::new();
        if !matches!(kind, AssociationKind::OneToOne | AssociationKind::ManyToOne)
            && referencing_key.is_some()
        {
            foreign.push("referencingKey");
        }
        if kind != AssociationKind::OneToOne && target_key.is_some() {
            foreign.push("targetKey");
        }
        if kind != AssociationKind::OneToMany && referenced_key.is_some() {
            foreign.push("referencedKey");
        }
        if kind != AssociationKind::ManyToMany {
            if join_resource.is_some() {
                foreign.push("joinResource");
            }
            if join_key_for_source.is_some() {
                foreign.push("joinKeyForSource");
            }
            if join_key_for_target.is_some() {
                foreign.push("joinKeyForTarget");
            }
        }
        if !foreign.is_empty() {
            return Err(fail(format!(
                "token(s) {} not valid for a {} association",
                foreign.join(", "),
                kind
            ))
            .into());
        }
        if dominant && kind != AssociationKind::ManyToMany {
            return Err(fail(format!("dominance only applies to many_to_many, not {}", kind)).into());
        }
        if !order_by.is_empty() && !kind.is_collection() {
            return Err(fail(format!("order_by not valid for a {} association", kind)).into());
        }

        if kind != AssociationKind::OneToMany && target.primary_key.is_none() {
            return Err(fail(format!(
                "target entity '{}' must declare a primary key for a {} association",
                target.name, kind
            ))
            .into());
        }
        let target_pk = target.primary_key.clone().unwrap_or_default();

        let keys = match kind {
            AssociationKind::OneToOne | AssociationKind::ManyToOne => {
                let referencing_key = referencing_key
                    .ok_or_else(|| fail("missing required token referencingKey".to_string()))?;
                AssociationKeys::Referencing {
                    referencing_key,
                    target_key: target_key.unwrap_or(target_pk),
                }
            }
            AssociationKind::OneToMany => AssociationKeys::Referenced {
                referenced_key: referenced_key
                    .ok_or_else(|| fail("missing required token referencedKey".to_string()))?,
            },
            AssociationKind::ManyToMany => {
                let missing: Vec<&str> = [
                    ("joinResource", join_resource.is_none()),
                    ("joinKeyForSource", join_key_for_source.is_none()),
                    ("joinKeyForTarget", join_key_for_target.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                match (join_resource, join_key_for_source, join_key_for_target) {
                    (Some(join_resource), Some(join_key_for_source), Some(join_key_for_target)) => {
                        if join_key_for_source == join_key_for_target {
                            return Err(fail(format!(
                                "join keys for source and target are both '{}'",
                                join_key_for_source
                            ))
                            .into());
                        }
                        AssociationKeys::Join {
                            join_resource,
                            join_key_for_source,
                            join_key_for_target,
                            dominant,
                        }
                    }
                    _ => {
                        return Err(fail(format!(
                            "missing required token(s) {}",
                            missing.join(", ")
                        ))
                        .into());
                    }
                }
            }
        };

        tracing::trace!(
            association = %property,
            kind = %kind,
            source = %source.name,
            target = %target.name,
            "Created association descriptor"
        );

        Ok(Self {
            kind,
            property,
            source,
            target,
            keys,
            order_by,
        })
    }

    pub const fn kind(&self) -> AssociationKind {
        self.kind
    }

    /// Property the association is exposed under on source rows.
    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn source(&self) -> &EntityHandle {
        &self.source
    }

    pub fn target(&self) -> &EntityHandle {
        &self.target
    }

    pub fn keys(&self) -> &AssociationKeys {
        &self.keys
    }

    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// Whether source and target live on different adapters.
    pub fn is_remote(&self) -> bool {
        self.source.adapter != self.target.adapter
    }

    pub const fn is_collection(&self) -> bool {
        self.kind.is_collection()
    }

    /// Foreign-key field on the source (OneToOne, ManyToOne).
    pub fn referencing_key(&self) -> Option<&str> {
        match &self.keys {
            AssociationKeys::Referencing {
                referencing_key, ..
            } => Some(referencing_key),
            _ => None,
        }
    }

    /// Field on the target holding the source primary key (OneToMany).
    pub fn referenced_key(&self) -> Option<&str> {
        match &self.keys {
            AssociationKeys::Referenced { referenced_key } => Some(referenced_key),
            _ => None,
        }
    }

    pub fn join_resource(&self) -> Option<&str> {
        match &self.keys {
            AssociationKeys::Join { join_resource, .. } => Some(join_resource),
            _ => None,
        }
    }

    pub fn join_key_for_source(&self) -> Option<&str> {
        match &self.keys {
            AssociationKeys::Join {
                join_key_for_source,
                ..
            } => Some(join_key_for_source),
            _ => None,
        }
    }

    pub fn join_key_for_target(&self) -> Option<&str> {
        match &self.keys {
            AssociationKeys::Join {
                join_key_for_target,
                ..
            } => Some(join_key_for_target),
            _ => None,
        }
    }

    pub fn is_dominant(&self) -> bool {
        matches!(self.keys, AssociationKeys::Join { dominant: true, .. })
    }

    /// Adapter holding the join resource: the source adapter when dominant,
    /// otherwise the target adapter. `None` for non-ManyToMany kinds.
    pub fn join_adapter(&self) -> Option<&str> {
        match &self.keys {
            AssociationKeys::Join { dominant: true, .. } => Some(&self.source.adapter),
            AssociationKeys::Join { dominant: false, .. } => Some(&self.target.adapter),
            _ => None,
        }
    }

    /// Source-row field whose values feed resolution.
    ///
    /// The referencing key for OneToOne/ManyToOne, the source primary key
    /// otherwise (`None` if the source declares none).
    pub fn correlation_field(&self) -> Option<&str> {
        match &self.keys {
            AssociationKeys::Referencing {
                referencing_key, ..
            } => Some(referencing_key),
            _ => self.source.primary_key.as_deref(),
        }
    }

    /// Target field that correlation values are matched against.
    ///
    /// For ManyToMany this is the target primary key, reached through the
    /// join resource.
    pub fn target_field(&self) -> &str {
        match &self.keys {
            AssociationKeys::Referencing { target_key, .. } => target_key,
            AssociationKeys::Referenced { referenced_key } => referenced_key,
            AssociationKeys::Join { .. } => self.target.primary_key.as_deref().unwrap_or_default(),
        }
    }
}
