//! fedorm - entities spread across independent stores, with relationships
//! resolved across them.
//!
//! Each entity lives behind a named [`Adapter`]. Associations between
//! entities are declared once as [`AssociationDescriptor`]s; reads that cross
//! adapters are federated by [`QueryFederator`] and relationship changes are
//! replayed as adapter calls by [`PersistenceCoordinator`].
//!
//! # Quick Start
//!
//! ```
//! use fedorm::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> fedorm::Result<()> {
//! let sql = MemoryAdapter::new("sql").with_table(
//!     "posts",
//!     Some("id"),
//!     vec![Row::from_pairs([("id", Value::BigInt(1)), ("author_id", Value::BigInt(7))])],
//! )?;
//! let docs = MemoryAdapter::new("docs").with_table(
//!     "authors",
//!     Some("id"),
//!     vec![Row::from_pairs([("id", Value::BigInt(7)), ("name", Value::from("Ada"))])],
//! )?;
//! let adapters = AdapterRegistry::new()
//!     .with(Arc::new(sql))
//!     .with(Arc::new(docs));
//!
//! let author = EntityMeta::new("Author", "docs", "authors")
//!     .primary_key("id")
//!     .field("name");
//! let mut post = EntityMeta::new("Post", "sql", "posts")
//!     .primary_key("id")
//!     .field("author_id");
//! let written_by = AssociationDescriptor::create(
//!     AssociationKind::ManyToOne,
//!     "author",
//!     &post,
//!     &author,
//!     DefinitionTokens::new().referencing_key("author_id"),
//!     false,
//! )?;
//! post.add_association(Arc::new(written_by))?;
//!
//! let posts = QueryFederator::new(&adapters)
//!     .select_many(&post, &SelectRequest::new().with("author"))?;
//! let name = posts.rows()[0]
//!     .relation("author")
//!     .and_then(Relation::as_one)
//!     .and_then(|a| a.get_by_name("name"));
//! assert_eq!(name, Some(&Value::from("Ada")));
//! # Ok(())
//! # }
//! ```

pub use fedorm_core::error::{
    AdapterError, AdapterErrorKind, AssociationConfigError, ConfigError, Error, InvalidChangeKind,
    InvalidChangeRequestError, JoinIntegrityError, Result, TypeError,
};
pub use fedorm_core::{
    Adapter, AdapterRegistry, AssociationDescriptor, AssociationKeys, AssociationKind, CompareOp,
    DefinitionTokens, EntityHandle, EntityMeta, EntityRegistry, FieldMeta, FieldRef, Filter,
    FromRow, KeyValue, LinkRequest, NullsOrder, OrderBy, OrderDirection, Relation, Row, SelectOne,
    SelectQuery, Value, col, distinct_keys, distinct_values, hydrate, sort_rows,
};
pub use fedorm_memory::{CallRecord, MemoryAdapter};
pub use fedorm_query::{
    FederationConfig, GroupMap, Grouped, QueryFederator, RelationResolver, Resolved,
    SelectRequest, Selection, UnmatchedPolicy, bucket_by, flatten, group, index_by,
};
pub use fedorm_session::{ChangeTracker, PersistenceCoordinator, SaveSummary, SlotChange};

/// The types most programs need.
///
/// ```
/// use fedorm::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Adapter, AdapterRegistry, AssociationDescriptor, AssociationKind, ChangeTracker,
        DefinitionTokens, EntityMeta, EntityRegistry, Error, FederationConfig, Filter, FromRow,
        MemoryAdapter, OrderBy, PersistenceCoordinator, QueryFederator, Relation, Result, Row,
        SaveSummary, SelectRequest, Selection, UnmatchedPolicy, Value, col,
    };
}
