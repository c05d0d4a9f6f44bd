//! Write path for fedorm.
//!
//! - `ChangeTracker`: pending attach/detach/add/remove for one relation
//! - `PersistenceCoordinator`: replays a tracker as adapter calls

pub mod change_tracker;
pub mod persist;

#[cfg(test)]
mod testing;

pub use change_tracker::{ChangeTracker, SlotChange};
pub use persist::{PersistenceCoordinator, SaveSummary};
