use multichain_wallet_sync::accounts::{AccountSource, StaticAccountSource, build_all};
use multichain_wallet_sync::balance::{
	BalanceAggregator, BalanceProvider, FixtureBalanceProvider, HttpBalanceProvider,
	group_across_chains,
};
use multichain_wallet_sync::config::AppConfig;
use multichain_wallet_sync::metrics::InMemoryMetrics;
use multichain_wallet_sync::recovery::classify_balance_error;
use multichain_wallet_sync::selection::{
	ActiveEntitySynchronizer, ActivePointerStore, FileKeyValueStore, InMemoryKeyValueStore,
	KeyValueStore,
};
use multichain_wallet_sync::utils::{format_fiat, format_token_amount};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_ACCOUNTS_PATH: &str = "demos/accounts.json";
const DEFAULT_BALANCES_PATH: &str = "demos/balances.json";

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,multichain_wallet_sync=debug")),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let config = match std::env::var("MULTICHAIN_CONFIG") {
		Ok(path) => match AppConfig::load(Path::new(&path)).await {
			Ok(config) => config,
			Err(e) => {
				error!("Failed to load config from {}: {}", path, e);
				return;
			}
		},
		Err(_) => AppConfig::default(),
	};

	let mut args = std::env::args().skip(1);
	let accounts_path = PathBuf::from(args.next().unwrap_or_else(|| DEFAULT_ACCOUNTS_PATH.to_string()));
	let balances_path = PathBuf::from(args.next().unwrap_or_else(|| DEFAULT_BALANCES_PATH.to_string()));

	let source = match StaticAccountSource::from_file(&accounts_path).await {
		Ok(source) => Arc::new(source),
		Err(e) => {
			error!("Failed to load accounts: {}", e);
			return;
		}
	};

	let provider: Arc<dyn BalanceProvider> = match &config.provider_base_url {
		Some(base_url) => match HttpBalanceProvider::new(base_url.as_str()) {
			Ok(provider) => Arc::new(provider),
			Err(e) => {
				error!("Failed to create balance provider: {}", e);
				return;
			}
		},
		None => match FixtureBalanceProvider::from_file(&balances_path).await {
			Ok(provider) => Arc::new(provider),
			Err(e) => {
				error!("Failed to load balance fixture: {}", e);
				return;
			}
		},
	};

	let metrics = Arc::new(InMemoryMetrics::new());
	let aggregator =
		BalanceAggregator::new(provider, config.aggregator.clone()).with_metrics(metrics.clone());
	let fiat_code = config.aggregator.fiat_code.as_str();
	let timeout = config.aggregator.fetch_timeout;

	let accounts = match source.chain_accounts().await {
		Ok(accounts) => accounts,
		Err(e) => {
			error!("Failed to read accounts: {}", e);
			return;
		}
	};
	let logical_accounts = build_all(&accounts);
	info!(
		"Grouped {} chain accounts into {} logical accounts",
		accounts.len(),
		logical_accounts.len()
	);

	for logical_account in &logical_accounts {
		info!(
			"Loading balances for {} ({}) on {} chain(s)",
			logical_account.label,
			logical_account.address,
			logical_account.len()
		);

		let mut result = aggregator
			.load_aggregated_with_progress(logical_account, fiat_code, timeout, |done, total, chain| {
				info!("  [{}/{}] chain {} resolved", done, total, chain)
			})
			.await;

		if !result.is_complete() {
			for (chain_id, e) in &result.failures {
				let recovery = classify_balance_error(logical_account, e, Some(&result));
				warn!("  chain {} failed ({}), recovery: {}", chain_id, e, recovery.tag());
			}
			let retry = aggregator
				.retry_subset(logical_account, &result.failed_chains(), fiat_code, timeout * 2)
				.await;
			result = result.merge_retry(retry);
		}

		for group in group_across_chains(&result.successes) {
			let totals = group.aggregate();
			info!(
				"  {:<24} {:>28} {:>16}  chains {:?}",
				group.display_name(),
				format_token_amount(totals.total_quantity, group.decimals),
				format_fiat(totals.total_fiat_value, fiat_code),
				group.chains().map(|c| c.0).collect::<Vec<_>>()
			);
		}
		info!(
			"  Total: {} ({} of {} chains)",
			format_fiat(result.total_fiat_value, fiat_code),
			result.successes.len(),
			result.requested_chains()
		);
	}

	let store: Arc<dyn KeyValueStore> = match &config.selection.data_dir {
		Some(data_dir) => Arc::new(FileKeyValueStore::new(data_dir.clone())),
		None => Arc::new(InMemoryKeyValueStore::new()),
	};
	let synchronizer = ActiveEntitySynchronizer::new(
		ActivePointerStore::new(store),
		source.clone(),
		&config.selection,
	);

	if let Some(account) = logical_accounts.first().and_then(|l| l.first_account()) {
		let change = synchronizer.select_single_chain(account).await;
		info!("Selected chain account: {:?}", change);
	}

	let change = synchronizer
		.toggle_mode(!synchronizer.is_multichain_enabled())
		.await;
	info!(
		"Multichain mode now {}: {:?}",
		synchronizer.is_multichain_enabled(),
		change
	);
	match synchronizer.active_multichain().await {
		Some(active) => info!(
			"Active logical account: {} ({}) on chains {:?}",
			active.label,
			active.address,
			active.chain_ids().map(|c| c.0).collect::<Vec<_>>()
		),
		None => info!("No active logical account"),
	}
	if let Some(pointer) = synchronizer.active_single_chain().await {
		info!(
			"Active single-chain account: {} on chain {}",
			pointer.address, pointer.chain_id
		);
	}

	info!("Recorded {} chain fetch samples", metrics.fetches().len());
}
