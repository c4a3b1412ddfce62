//! Multichain balance aggregation.
//!
//! This module defines the `BalanceAggregator`, which fetches the balance of every chain
//! deployment of a logical account concurrently and folds the outcomes into one
//! `AggregateBalanceResult`.
//!
//! The aggregator is responsible for:
//! - Spawning one fetch per chain into a `JoinSet` owned by the call
//! - Bounding each fetch by its own timeout, so a slow chain never holds up its siblings
//! - Joining every fetch before returning, recording failures per chain instead of failing fast
//! - Reporting per-chain completion progress and metrics samples
//!
//! Dropping the future returned by any aggregation method drops the `JoinSet`, which aborts
//! every fetch still in flight. No fetch outlives the call that started it.

use crate::accounts::{ChainAccount, ChainId, LogicalAccount};
use crate::balance::progress::AggregationProgress;
use crate::balance::provider::BalanceProvider;
use crate::balance::types::{AggregateBalanceResult, BalanceSnapshot};
use crate::config::AggregatorConfig;
use crate::error::FetchError;
use crate::metrics::{FetchOutcome, MetricsSink, NoopMetrics};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Fans balance fetches out to every chain of a logical account
pub struct BalanceAggregator {
	provider: Arc<dyn BalanceProvider>,
	metrics: Arc<dyn MetricsSink>,
	config: AggregatorConfig,
}

impl BalanceAggregator {
	pub fn new(provider: Arc<dyn BalanceProvider>, config: AggregatorConfig) -> Self {
		Self {
			provider,
			metrics: Arc::new(NoopMetrics),
			config,
		}
	}

	/// Replace the metrics sink samples are reported to
	pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
		self.metrics = metrics;
		self
	}

	pub fn config(&self) -> &AggregatorConfig {
		&self.config
	}

	/// Fetch the balance of a single chain account, bounded by `timeout`.
	///
	/// This is the primitive every aggregation is built from. It never retries.
	pub async fn load_single(
		&self,
		account: &ChainAccount,
		fiat_code: &str,
		timeout: Duration,
	) -> Result<BalanceSnapshot, FetchError> {
		fetch_bounded(
			self.provider.as_ref(),
			self.metrics.as_ref(),
			account,
			fiat_code,
			timeout,
		)
		.await
	}

	/// Fetch every chain of `logical_account` concurrently and wait for all of them.
	///
	/// Never returns an error: each chain ends up either in `successes` or in `failures`.
	pub async fn load_aggregated(
		&self,
		logical_account: &LogicalAccount,
		fiat_code: &str,
		timeout: Duration,
	) -> AggregateBalanceResult {
		let accounts = logical_account.accounts().values().cloned().collect();
		self.fan_out(accounts, fiat_code, timeout, &mut |_: usize, _: usize, _: ChainId| {})
			.await
	}

	/// Same as `load_aggregated`, calling `on_progress(completed, total, chain)` once per
	/// resolved chain.
	///
	/// Calls are made from the join loop one at a time, in completion order.
	pub async fn load_aggregated_with_progress<F>(
		&self,
		logical_account: &LogicalAccount,
		fiat_code: &str,
		timeout: Duration,
		mut on_progress: F,
	) -> AggregateBalanceResult
	where
		F: FnMut(usize, usize, ChainId) + Send,
	{
		let accounts = logical_account.accounts().values().cloned().collect();
		self.fan_out(accounts, fiat_code, timeout, &mut on_progress)
			.await
	}

	/// Re-run the aggregation for `failed_chains` only.
	///
	/// The returned result covers just those chains; folding it into an earlier result is up
	/// to the caller (see `AggregateBalanceResult::merge_retry`). Chains that are not part of
	/// `logical_account` are ignored.
	pub async fn retry_subset(
		&self,
		logical_account: &LogicalAccount,
		failed_chains: &[ChainId],
		fiat_code: &str,
		timeout: Duration,
	) -> AggregateBalanceResult {
		let mut accounts = Vec::with_capacity(failed_chains.len());
		for chain_id in failed_chains.iter().collect::<BTreeSet<_>>() {
			match logical_account.account_for(*chain_id) {
				Some(account) => accounts.push(account.clone()),
				None => warn!(
					"Skipping retry for chain {}: {} is not deployed there",
					chain_id, logical_account.address
				),
			}
		}

		info!(
			"Retrying balance fetch for {} on {} chain(s)",
			logical_account.address,
			accounts.len()
		);
		self.fan_out(accounts, fiat_code, timeout, &mut |_: usize, _: usize, _: ChainId| {})
			.await
	}

	async fn fan_out(
		&self,
		accounts: Vec<ChainAccount>,
		fiat_code: &str,
		timeout: Duration,
		on_progress: &mut (dyn FnMut(usize, usize, ChainId) + Send),
	) -> AggregateBalanceResult {
		let started = Instant::now();
		let mut result = AggregateBalanceResult::default();
		let mut progress = AggregationProgress::new(accounts.len(), self.config.progress_log_interval);
		let mut pending: BTreeSet<ChainId> = accounts.iter().map(|a| a.chain_id).collect();

		if accounts.is_empty() {
			debug!("No chains to aggregate");
			return result;
		}

		let mut tasks = JoinSet::new();
		for account in accounts {
			let provider = Arc::clone(&self.provider);
			let metrics = Arc::clone(&self.metrics);
			let fiat_code = fiat_code.to_string();
			tasks.spawn(async move {
				let outcome = fetch_bounded(
					provider.as_ref(),
					metrics.as_ref(),
					&account,
					&fiat_code,
					timeout,
				)
				.await;
				(account.chain_id, outcome)
			});
		}

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok((chain_id, outcome)) => {
					pending.remove(&chain_id);
					complete_chain(&mut result, &mut progress, chain_id, outcome, on_progress);
				}
				Err(e) => error!("Balance fetch task ended abnormally: {}", e),
			}
		}

		// Chains whose task panicked never reported back
		for chain_id in pending {
			complete_chain(
				&mut result,
				&mut progress,
				chain_id,
				Err(FetchError::TaskFailed(
					"fetch task ended without a result".to_string(),
				)),
				on_progress,
			);
		}

		let stats = progress.get_stats();
		info!("Balance aggregation finished: {}", stats.summary());
		self.metrics
			.record_aggregation(stats.total_chains, stats.failed_chains, started.elapsed());

		result
	}
}

fn complete_chain(
	result: &mut AggregateBalanceResult,
	progress: &mut AggregationProgress,
	chain_id: ChainId,
	outcome: Result<BalanceSnapshot, FetchError>,
	on_progress: &mut (dyn FnMut(usize, usize, ChainId) + Send),
) {
	let succeeded = outcome.is_ok();
	let timed_out = matches!(&outcome, Err(e) if e.is_timeout());

	match outcome {
		Ok(snapshot) => result.record_success(chain_id, snapshot),
		Err(e) => {
			warn!("Balance fetch failed on chain {}: {}", chain_id, e);
			result.record_failure(chain_id, e);
		}
	}

	let completed = progress.record(chain_id, succeeded, timed_out);
	on_progress(completed, progress.total(), chain_id);
}

async fn fetch_bounded(
	provider: &dyn BalanceProvider,
	metrics: &dyn MetricsSink,
	account: &ChainAccount,
	fiat_code: &str,
	timeout: Duration,
) -> Result<BalanceSnapshot, FetchError> {
	let started = Instant::now();

	let outcome = match tokio::time::timeout(timeout, provider.fetch_balance(account, fiat_code)).await {
		Ok(result) => result,
		Err(_) => Err(FetchError::Timeout { after: timeout }),
	};

	let label = match &outcome {
		Ok(_) => FetchOutcome::Success,
		Err(e) if e.is_timeout() => FetchOutcome::Timeout,
		Err(_) => FetchOutcome::Failure,
	};
	metrics.record_chain_fetch(account.chain_id, started.elapsed(), label);

	outcome
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::accounts::build_all;
	use crate::balance::types::{TokenKind, TokenRecord};
	use crate::metrics::InMemoryMetrics;
	use std::collections::HashMap;
	use std::sync::Mutex;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[derive(Clone)]
	enum Script {
		Succeed { fiat: f64, delay_ms: u64 },
		Fail(FetchError),
		Hang,
		Panic,
	}

	/// Decrements the live-fetch counter when a fetch future is dropped
	struct LiveGuard(Arc<AtomicUsize>);

	impl LiveGuard {
		fn enter(live: &Arc<AtomicUsize>) -> Self {
			live.fetch_add(1, Ordering::SeqCst);
			Self(Arc::clone(live))
		}
	}

	impl Drop for LiveGuard {
		fn drop(&mut self) {
			self.0.fetch_sub(1, Ordering::SeqCst);
		}
	}

	#[derive(Default)]
	struct ScriptedProvider {
		scripts: HashMap<ChainId, Script>,
		live: Arc<AtomicUsize>,
	}

	impl ScriptedProvider {
		fn with(mut self, chain: u64, script: Script) -> Self {
			self.scripts.insert(ChainId(chain), script);
			self
		}

		fn succeed(self, chain: u64, fiat: f64) -> Self {
			self.with(chain, Script::Succeed { fiat, delay_ms: 0 })
		}
	}

	#[async_trait::async_trait]
	impl BalanceProvider for ScriptedProvider {
		async fn fetch_balance(
			&self,
			account: &ChainAccount,
			_fiat_code: &str,
		) -> Result<BalanceSnapshot, FetchError> {
			let _guard = LiveGuard::enter(&self.live);
			match self.scripts.get(&account.chain_id).cloned() {
				Some(Script::Succeed { fiat, delay_ms }) => {
					tokio::time::sleep(Duration::from_millis(delay_ms)).await;
					Ok(BalanceSnapshot::new(vec![native_token(fiat)]))
				}
				Some(Script::Fail(error)) => Err(error),
				Some(Script::Hang) => {
					std::future::pending::<()>().await;
					unreachable!()
				}
				Some(Script::Panic) => panic!("provider blew up"),
				None => Err(FetchError::Backend("unscripted chain".to_string())),
			}
		}
	}

	fn native_token(fiat: f64) -> TokenRecord {
		TokenRecord {
			contract_address: crate::accounts::Address::zero(),
			symbol: "ETH".to_string(),
			name: None,
			decimals: 18,
			raw_quantity: 1,
			fiat_value: fiat,
			kind: TokenKind::Native,
			logo_url: None,
		}
	}

	fn logical(chains: &[u64]) -> LogicalAccount {
		let accounts: Vec<_> = chains
			.iter()
			.map(|chain| ChainAccount::new("0xa", *chain, "Main"))
			.collect();
		build_all(&accounts).remove(0)
	}

	fn aggregator(provider: ScriptedProvider) -> BalanceAggregator {
		BalanceAggregator::new(Arc::new(provider), AggregatorConfig::default())
	}

	#[tokio::test(start_paused = true)]
	async fn test_slow_chain_times_out_without_affecting_others() {
		let aggregator = aggregator(ScriptedProvider::default().succeed(1, 100.0).with(137, Script::Hang));

		let result = aggregator
			.load_aggregated(&logical(&[1, 137]), "USD", Duration::from_millis(5))
			.await;

		assert_eq!(result.total_fiat_value, 100.0);
		assert_eq!(result.succeeded_chains(), vec![ChainId(1)]);
		assert_eq!(result.failed_chains(), vec![ChainId(137)]);
		assert_eq!(
			result.failures[&ChainId(137)],
			FetchError::Timeout {
				after: Duration::from_millis(5)
			}
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_every_chain_is_accounted_for_once() {
		let provider = ScriptedProvider::default()
			.succeed(1, 10.0)
			.succeed(10, 20.0)
			.with(56, Script::Fail(FetchError::Network("reset".into())))
			.with(137, Script::Hang)
			.with(8453, Script::Succeed { fiat: 5.0, delay_ms: 3 });
		let chains = [1, 10, 56, 137, 8453];

		let result = aggregator(provider)
			.load_aggregated(&logical(&chains), "USD", Duration::from_millis(50))
			.await;

		assert_eq!(result.requested_chains(), chains.len());
		for chain in chains {
			let chain = ChainId(chain);
			assert!(result.successes.contains_key(&chain) ^ result.failures.contains_key(&chain));
		}
		let expected: f64 = result.successes.values().map(|s| s.fiat_total).sum();
		assert_eq!(result.total_fiat_value, expected);
		assert_eq!(result.total_fiat_value, 35.0);
		assert_eq!(result.failures[&ChainId(56)], FetchError::Network("reset".into()));
	}

	#[tokio::test(start_paused = true)]
	async fn test_progress_reported_once_per_chain() {
		let provider = ScriptedProvider::default()
			.with(1, Script::Succeed { fiat: 1.0, delay_ms: 2 })
			.with(10, Script::Hang)
			.with(137, Script::Succeed { fiat: 1.0, delay_ms: 1 });
		let events = Mutex::new(Vec::new());

		aggregator(provider)
			.load_aggregated_with_progress(
				&logical(&[1, 10, 137]),
				"USD",
				Duration::from_millis(20),
				|completed, total, chain| events.lock().unwrap().push((completed, total, chain)),
			)
			.await;

		assert_eq!(
			events.into_inner().unwrap(),
			vec![
				(1, 3, ChainId(137)),
				(2, 3, ChainId(1)),
				(3, 3, ChainId(10)),
			]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_retry_subset_only_covers_requested_chains() {
		let provider = ScriptedProvider::default().succeed(1, 100.0).succeed(137, 8.0);
		let account = logical(&[1, 137]);

		let retry = aggregator(provider)
			.retry_subset(&account, &[ChainId(137), ChainId(999)], "USD", Duration::from_millis(5))
			.await;

		assert_eq!(retry.succeeded_chains(), vec![ChainId(137)]);
		assert!(retry.failures.is_empty());
		assert_eq!(retry.total_fiat_value, 8.0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_load_single_reports_timeout() {
		let aggregator = aggregator(ScriptedProvider::default().with(1, Script::Hang));

		let error = aggregator
			.load_single(&ChainAccount::new("0xa", 1, "Main"), "USD", Duration::from_millis(5))
			.await
			.unwrap_err();

		assert!(error.is_timeout());
	}

	#[tokio::test(start_paused = true)]
	async fn test_panicking_fetch_is_recorded_as_failure() {
		let aggregator = aggregator(ScriptedProvider::default().succeed(1, 3.0).with(10, Script::Panic));

		let result = aggregator
			.load_aggregated(&logical(&[1, 10]), "USD", Duration::from_millis(5))
			.await;

		assert_eq!(result.succeeded_chains(), vec![ChainId(1)]);
		assert!(matches!(result.failures[&ChainId(10)], FetchError::TaskFailed(_)));
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancelling_aggregation_cancels_every_fetch() {
		let provider = ScriptedProvider::default()
			.with(1, Script::Hang)
			.with(10, Script::Hang)
			.with(137, Script::Hang);
		let live = Arc::clone(&provider.live);
		let aggregator = Arc::new(aggregator(provider));
		let account = logical(&[1, 10, 137]);

		let handle = tokio::spawn({
			let aggregator = Arc::clone(&aggregator);
			async move {
				aggregator
					.load_aggregated(&account, "USD", Duration::from_secs(60))
					.await
			}
		});

		while live.load(Ordering::SeqCst) < 3 {
			tokio::task::yield_now().await;
		}
		handle.abort();
		assert!(handle.await.unwrap_err().is_cancelled());

		tokio::time::sleep(Duration::from_millis(1)).await;
		assert_eq!(live.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_metrics_sink_receives_samples() {
		let metrics = Arc::new(InMemoryMetrics::new());
		let aggregator = aggregator(
			ScriptedProvider::default()
				.succeed(1, 1.0)
				.with(137, Script::Hang),
		)
		.with_metrics(metrics.clone());

		aggregator
			.load_aggregated(&logical(&[1, 137]), "USD", Duration::from_millis(5))
			.await;

		let mut outcomes: Vec<_> = metrics
			.fetches()
			.into_iter()
			.map(|s| (s.chain_id, s.outcome))
			.collect();
		outcomes.sort_by_key(|(chain, _)| *chain);
		assert_eq!(
			outcomes,
			vec![
				(ChainId(1), FetchOutcome::Success),
				(ChainId(137), FetchOutcome::Timeout)
			]
		);
		let aggregations = metrics.aggregations();
		assert_eq!(aggregations.len(), 1);
		assert_eq!(aggregations[0].total_chains, 2);
		assert_eq!(aggregations[0].failed_chains, 1);
	}
}
