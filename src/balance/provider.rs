//! Per-account balance fetch providers.
//!
//! The aggregator treats a provider as an opaque operation: latency and failure taxonomy are
//! whatever the backend produces, mapped into `FetchError` kinds here.

use crate::accounts::{Address, ChainAccount, ChainId};
use crate::balance::types::{BalanceSnapshot, TokenRecord};
use crate::error::FetchError;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Fetches the balance of one account on its chain
#[async_trait::async_trait]
pub trait BalanceProvider: Send + Sync {
	async fn fetch_balance(
		&self,
		account: &ChainAccount,
		fiat_code: &str,
	) -> Result<BalanceSnapshot, FetchError>;
}

/// Failure scripted into a fixture entry
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum ScriptedFailure {
	Network(String),
	UnresolvedHost(String),
	Backend(String),
}

impl From<ScriptedFailure> for FetchError {
	fn from(value: ScriptedFailure) -> Self {
		match value {
			ScriptedFailure::Network(message) => FetchError::Network(message),
			ScriptedFailure::UnresolvedHost(message) => FetchError::UnresolvedHost(message),
			ScriptedFailure::Backend(message) => FetchError::Backend(message),
		}
	}
}

/// Balance of one account on one chain, as stored in a fixture file
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureEntry {
	#[serde(rename = "chainId")]
	pub chain_id: ChainId,
	pub address: Address,
	/// Artificial latency before answering
	#[serde(rename = "delayMs", default)]
	pub delay_ms: u64,
	#[serde(default)]
	pub failure: Option<ScriptedFailure>,
	#[serde(default)]
	pub tokens: Vec<TokenRecord>,
}

/// Provider answering from fixture data, with optional delays and scripted failures
#[derive(Debug, Clone, Default)]
pub struct FixtureBalanceProvider {
	entries: HashMap<(ChainId, Address), FixtureEntry>,
}

impl FixtureBalanceProvider {
	pub fn new(entries: Vec<FixtureEntry>) -> Self {
		Self {
			entries: entries
				.into_iter()
				.map(|entry| ((entry.chain_id, entry.address.clone()), entry))
				.collect(),
		}
	}

	/// Load a JSON array of fixture entries
	pub async fn from_file(path: &Path) -> Result<Self, FetchError> {
		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			FetchError::Backend(format!("Failed to read balance fixture {:?}: {}", path, e))
		})?;
		let entries: Vec<FixtureEntry> = serde_json::from_str(&content).map_err(|e| {
			FetchError::Backend(format!("Failed to parse balance fixture {:?}: {}", path, e))
		})?;
		info!("Loaded {} balance fixture entries from {:?}", entries.len(), path);
		Ok(Self::new(entries))
	}
}

#[async_trait::async_trait]
impl BalanceProvider for FixtureBalanceProvider {
	async fn fetch_balance(
		&self,
		account: &ChainAccount,
		_fiat_code: &str,
	) -> Result<BalanceSnapshot, FetchError> {
		let entry = self
			.entries
			.get(&(account.chain_id, account.address.clone()))
			.ok_or_else(|| {
				FetchError::Backend(format!(
					"No balance data for {} on chain {}",
					account.address, account.chain_id
				))
			})?;

		if entry.delay_ms > 0 {
			tokio::time::sleep(Duration::from_millis(entry.delay_ms)).await;
		}

		match &entry.failure {
			Some(failure) => Err(failure.clone().into()),
			None => Ok(BalanceSnapshot::new(entry.tokens.clone())),
		}
	}
}

/// Bound on establishing a connection to the balance backend
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider backed by a REST balance backend.
///
/// Only connection setup is time-bounded here. The whole request is bounded by the caller's
/// per-chain timeout, so a retry with a longer bound really waits longer.
#[derive(Clone)]
pub struct HttpBalanceProvider {
	http_client: Client,
	base_url: String,
	connect_timeout: Duration,
}

impl HttpBalanceProvider {
	pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
		Self::with_connect_timeout(base_url, DEFAULT_CONNECT_TIMEOUT)
	}

	pub fn with_connect_timeout(
		base_url: impl Into<String>,
		connect_timeout: Duration,
	) -> Result<Self, FetchError> {
		let http_client = Client::builder()
			.connect_timeout(connect_timeout)
			.build()
			.map_err(|e| FetchError::Network(format!("Failed to create HTTP client: {}", e)))?;

		Ok(Self {
			http_client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			connect_timeout,
		})
	}

	fn balances_url(&self, account: &ChainAccount) -> String {
		format!(
			"{}/v1/chains/{}/accounts/{}/balances",
			self.base_url, account.chain_id, account.address
		)
	}

	fn map_transport_error(&self, error: reqwest::Error) -> FetchError {
		if error.is_timeout() {
			FetchError::Timeout {
				after: self.connect_timeout,
			}
		} else if error.is_connect() && is_dns_failure(&error) {
			FetchError::UnresolvedHost(error.to_string())
		} else if error.is_status() || error.is_decode() {
			FetchError::Backend(error.to_string())
		} else {
			FetchError::Network(error.to_string())
		}
	}
}

/// Whether any error in the source chain reports a failed name lookup
fn is_dns_failure(error: &(dyn std::error::Error + 'static)) -> bool {
	let mut current = Some(error);
	while let Some(err) = current {
		let message = err.to_string().to_ascii_lowercase();
		if message.contains("dns error")
			|| message.contains("failed to lookup address")
			|| message.contains("name resolution")
		{
			return true;
		}
		current = err.source();
	}
	false
}

#[async_trait::async_trait]
impl BalanceProvider for HttpBalanceProvider {
	async fn fetch_balance(
		&self,
		account: &ChainAccount,
		fiat_code: &str,
	) -> Result<BalanceSnapshot, FetchError> {
		let url = self.balances_url(account);
		debug!("Fetching balances from {}", url);

		let response = self
			.http_client
			.get(&url)
			.query(&[("currency", fiat_code)])
			.send()
			.await
			.map_err(|e| self.map_transport_error(e))?;

		let status = response.status();
		if !status.is_success() {
			return Err(FetchError::Backend(format!(
				"Balance backend returned {} for {} on chain {}",
				status, account.address, account.chain_id
			)));
		}

		response
			.json::<BalanceSnapshot>()
			.await
			.map_err(|e| self.map_transport_error(e))
	}
}
