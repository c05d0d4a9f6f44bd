//! Read path for fedorm.
//!
//! - `grouping`: the in-memory grouping join
//! - `RelationResolver`: fetches related rows for a batch of source keys
//! - `QueryFederator`: primary selects with local and remote associations

pub mod config;
pub mod federator;
pub mod grouping;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use config::{FederationConfig, UnmatchedPolicy};
pub use federator::{QueryFederator, SelectRequest, Selection};
pub use grouping::{GroupMap, Grouped, bucket_by, flatten, group, index_by};
pub use resolver::{RelationResolver, Resolved};
