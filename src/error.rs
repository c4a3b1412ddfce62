//! Error types shared across the aggregation, selection and persistence layers.

use std::time::Duration;

/// Failure of a single per-chain balance fetch.
///
/// These are always scoped to one chain and land in the failure map of an
/// `AggregateBalanceResult`; they never abort a whole aggregation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
	#[error("Timed out after {}ms", .after.as_millis())]
	Timeout { after: Duration },

	#[error("Network error: {0}")]
	Network(String),

	#[error("Unable to resolve host: {0}")]
	UnresolvedHost(String),

	#[error("Backend error: {0}")]
	Backend(String),

	#[error("Fetch task failed: {0}")]
	TaskFailed(String),
}

impl FetchError {
	pub fn is_timeout(&self) -> bool {
		matches!(self, FetchError::Timeout { .. })
	}

	/// Whether the failure points at the local connection rather than the backend.
	pub fn is_connectivity(&self) -> bool {
		matches!(self, FetchError::Network(_) | FetchError::UnresolvedHost(_))
	}
}

/// Errors raised by a key-value store backing the active pointers
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Invalid store key: {0}")]
	InvalidKey(String),
}

/// Errors raised by an account source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
	#[error("Account source unavailable: {0}")]
	Unavailable(String),

	#[error("Account parse error: {0}")]
	Parse(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

/// Errors raised by higher-level selection flows.
///
/// This crate only classifies these (see `recovery`), it never retries them.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
	#[error("No accounts available for selection")]
	NoAccounts,

	#[error("Store error: {0}")]
	Store(#[from] StoreError),

	#[error("Source error: {0}")]
	Source(#[from] SourceError),

	#[error("Selection rejected: {0}")]
	Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Config parse error: {0}")]
	Parse(#[from] serde_json::Error),
}
