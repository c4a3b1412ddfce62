//! Injected metrics sink for balance aggregation.
//!
//! Aggregators take a `MetricsSink` at construction instead of writing to process-wide
//! counters, so every caller decides where (and whether) samples go.

use crate::accounts::ChainId;
use std::sync::Mutex;
use std::time::Duration;

/// Outcome label for a single chain fetch sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
	Success,
	Timeout,
	Failure,
}

pub trait MetricsSink: Send + Sync {
	/// Called once per chain fetch, whatever its outcome
	fn record_chain_fetch(&self, chain_id: ChainId, elapsed: Duration, outcome: FetchOutcome);

	/// Called once per aggregation after every chain resolved
	fn record_aggregation(&self, total_chains: usize, failed_chains: usize, elapsed: Duration);
}

/// Sink that drops every sample
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
	fn record_chain_fetch(&self, _chain_id: ChainId, _elapsed: Duration, _outcome: FetchOutcome) {}

	fn record_aggregation(&self, _total_chains: usize, _failed_chains: usize, _elapsed: Duration) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainFetchSample {
	pub chain_id: ChainId,
	pub elapsed: Duration,
	pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationSample {
	pub total_chains: usize,
	pub failed_chains: usize,
	pub elapsed: Duration,
}

/// Sink that keeps every sample in memory
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
	fetches: Mutex<Vec<ChainFetchSample>>,
	aggregations: Mutex<Vec<AggregationSample>>,
}

impl InMemoryMetrics {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn fetches(&self) -> Vec<ChainFetchSample> {
		self.fetches.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}

	pub fn aggregations(&self) -> Vec<AggregationSample> {
		self.aggregations
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.clone()
	}
}

impl MetricsSink for InMemoryMetrics {
	fn record_chain_fetch(&self, chain_id: ChainId, elapsed: Duration, outcome: FetchOutcome) {
		self.fetches
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.push(ChainFetchSample {
				chain_id,
				elapsed,
				outcome,
			});
	}

	fn record_aggregation(&self, total_chains: usize, failed_chains: usize, elapsed: Duration) {
		self.aggregations
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.push(AggregationSample {
				total_chains,
				failed_chains,
				elapsed,
			});
	}
}
