//! Balance fetching and aggregation across chains.
//!
//! - `provider`: The per-account balance fetch abstraction and its fixture and HTTP implementations.
//! - `aggregator`: Concurrent per-chain fan-out with independent timeouts and partial-failure capture.
//! - `progress`: Completion tracking for a running aggregation.
//! - `tokens`: Canonical token identity and cross-chain grouping.
//! - `types`: Token records, per-chain snapshots and aggregate results.

/// Concurrent multichain balance aggregation
pub mod aggregator;
/// Tracks aggregation progress and statistics
pub mod progress;
/// Balance fetch providers
pub mod provider;
/// Cross-chain token identity resolution
pub mod tokens;
/// Balance data types
pub mod types;

pub use aggregator::BalanceAggregator;
pub use provider::{BalanceProvider, FixtureBalanceProvider, HttpBalanceProvider};
pub use tokens::{TokenGroup, TokenTotals, canonical_key, group_across_chains};
pub use types::*;
