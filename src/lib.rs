//! Multichain wallet balance aggregation and active-selection synchronization.
//!
//! A wallet deployed at the same address on several chains is treated as one logical
//! account: its per-chain records are grouped, balances are fetched from every chain
//! concurrently and merged across chains, and the legacy single-chain selection is kept
//! consistent with the multichain selection as the multichain mode flag is toggled.

pub mod accounts;
pub mod balance;
pub mod config;
pub mod error;
pub mod metrics;
pub mod recovery;
pub mod selection;
pub mod utils;
