//! Account records and their grouping into multichain entities.
//!
//! A wallet deployed at the same address on several chains is represented by one
//! `ChainAccount` per chain. The grouping index folds those records into `LogicalAccount`s,
//! which the balance aggregator and the selection synchronizer operate on.

/// Grouping of per-chain records by address
pub mod grouping;
/// Account source abstraction
pub mod source;
/// Account and address types
pub mod types;

pub use grouping::{build_all, find_by_address};
pub use source::{AccountSource, StaticAccountSource};
pub use types::*;
