//! Progress tracking for a balance aggregation.
//!
//! This module provides `AggregationProgress`, which counts per-chain completions while a
//! fan-out is being joined. It is owned by the join loop and borrowed mutably for each
//! completion, so counting and reporting never race even though fetches finish concurrently.

use crate::accounts::ChainId;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Tracks completed chains of one aggregation
#[derive(Debug, Clone)]
pub struct AggregationProgress {
	/// Number of chains requested
	total: usize,
	/// Chains that have resolved, in any way
	completed: BTreeSet<ChainId>,
	/// Chains that resolved with a snapshot
	succeeded: usize,
	/// Chains that resolved with a timeout
	timed_out: usize,
	/// Completions between two progress log lines
	log_interval: usize,
}

impl AggregationProgress {
	pub fn new(total: usize, log_interval: usize) -> Self {
		Self {
			total,
			completed: BTreeSet::new(),
			succeeded: 0,
			timed_out: 0,
			log_interval: log_interval.max(1),
		}
	}

	/// Record a completed chain and return the running completion count.
	///
	/// A chain that was already recorded is not counted twice.
	pub fn record(&mut self, chain_id: ChainId, succeeded: bool, timed_out: bool) -> usize {
		if !self.completed.insert(chain_id) {
			debug!("Chain {} already recorded as complete", chain_id);
			return self.completed.len();
		}
		if succeeded {
			self.succeeded += 1;
		}
		if timed_out {
			self.timed_out += 1;
		}
		self.log_progress(chain_id);
		self.completed.len()
	}

	pub fn completed(&self) -> usize {
		self.completed.len()
	}

	pub fn total(&self) -> usize {
		self.total
	}

	pub fn is_complete(&self) -> bool {
		self.completed.len() >= self.total
	}

	fn log_progress(&self, chain_id: ChainId) {
		let completed = self.completed.len();
		if completed % self.log_interval == 0 || completed == self.total {
			info!(
				"Balance aggregation progress: {}/{} chains complete (last: chain {})",
				completed, self.total, chain_id
			);
		}
	}

	pub fn get_stats(&self) -> AggregationStats {
		AggregationStats {
			total_chains: self.total,
			completed_chains: self.completed.len(),
			succeeded_chains: self.succeeded,
			failed_chains: self.completed.len() - self.succeeded,
			timed_out_chains: self.timed_out,
		}
	}
}

/// Statistics about one aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationStats {
	pub total_chains: usize,
	pub completed_chains: usize,
	pub succeeded_chains: usize,
	pub failed_chains: usize,
	pub timed_out_chains: usize,
}

impl AggregationStats {
	pub fn summary(&self) -> String {
		format!(
			"{}/{} chains complete: {} succeeded, {} failed{}",
			self.completed_chains,
			self.total_chains,
			self.succeeded_chains,
			self.failed_chains,
			if self.timed_out_chains == 0 {
				String::new()
			} else {
				format!(" ({} timed out)", self.timed_out_chains)
			}
		)
	}
}
