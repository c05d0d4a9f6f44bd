//! Core types and traits for fedorm.
//!
//! This crate provides the shared vocabulary of the resolution and persistence
//! engines:
//!
//! - `Value`, `KeyValue` and `Row` for data exchanged with stores
//! - `Filter` and `OrderBy` for backend-neutral queries
//! - `EntityMeta` and `AssociationDescriptor` for declared relationships
//! - the `Adapter` trait every backing store implements

pub mod adapter;
pub mod association;
pub mod entity;
pub mod error;
pub mod filter;
pub mod key;
pub mod order;
pub mod row;
pub mod value;

pub use adapter::{Adapter, AdapterRegistry, LinkRequest, SelectOne, SelectQuery};
pub use association::{AssociationDescriptor, AssociationKeys, AssociationKind, DefinitionTokens};
pub use entity::{EntityHandle, EntityMeta, EntityRegistry, FieldMeta};
pub use error::{
    AdapterError, AdapterErrorKind, AssociationConfigError, ConfigError, Error,
    InvalidChangeKind, InvalidChangeRequestError, JoinIntegrityError, Result, TypeError,
};
pub use filter::{CompareOp, FieldRef, Filter, col};
pub use key::{KeyValue, distinct_keys, distinct_values};
pub use order::{NullsOrder, OrderBy, OrderDirection, sort_rows};
pub use row::{FromRow, Relation, Row, hydrate};
pub use value::Value;
