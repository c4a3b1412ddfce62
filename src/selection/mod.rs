//! Active-selection persistence and reconciliation.
//!
//! - `store`: Key-value persistence with replay-last-value change notification.
//! - `pointers`: Typed access to the single-chain and multichain pointers.
//! - `synchronizer`: Reconciles the two pointers as the multichain mode flag changes.

/// Typed active-pointer access
pub mod pointers;
/// Key-value stores backing the pointers
pub mod store;
/// Pointer reconciliation
pub mod synchronizer;

pub use pointers::{ActivePointerStore, MultichainPointer, SingleChainPointer};
pub use store::{FileKeyValueStore, InMemoryKeyValueStore, KeyValueStore};
pub use synchronizer::{ActiveEntitySynchronizer, SelectionChange};
