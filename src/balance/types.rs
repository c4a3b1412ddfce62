//! Balance data returned by per-chain fetches and by a multichain aggregation.

use crate::accounts::{Address, ChainId};
use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a holding is the chain's native currency or a contract token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
	Native,
	#[default]
	Contract,
}

/// One token holding on one chain.
///
/// Native currency is identified by the sentinel zero contract address or by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
	#[serde(rename = "contractAddress")]
	pub contract_address: Address,
	pub symbol: String,
	#[serde(default)]
	pub name: Option<String>,
	pub decimals: u32,
	/// Quantity in the token's smallest unit
	#[serde(rename = "rawQuantity", with = "raw_quantity")]
	pub raw_quantity: u128,
	#[serde(rename = "fiatValue", default)]
	pub fiat_value: f64,
	#[serde(default)]
	pub kind: TokenKind,
	#[serde(rename = "logoUrl", default)]
	pub logo_url: Option<String>,
}

impl TokenRecord {
	pub fn is_native(&self) -> bool {
		self.kind == TokenKind::Native || self.contract_address.is_zero()
	}
}

/// Raw quantities travel as decimal strings so values above 2^53 survive JSON.
mod raw_quantity {
	use serde::{Deserialize, Deserializer, Serializer, de::Error};

	pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&value.to_string())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Raw {
			Text(String),
			Number(u64),
		}

		match Raw::deserialize(deserializer)? {
			Raw::Text(text) => text.parse().map_err(D::Error::custom),
			Raw::Number(number) => Ok(number as u128),
		}
	}
}

/// Result of one successful per-chain fetch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSnapshot {
	pub tokens: Vec<TokenRecord>,
	/// Sum of the tokens' fiat values, computed at construction
	#[serde(rename = "fiatTotal")]
	pub fiat_total: f64,
}

impl BalanceSnapshot {
	pub fn new(tokens: Vec<TokenRecord>) -> Self {
		let fiat_total = tokens.iter().map(|token| token.fiat_value).sum();
		Self { tokens, fiat_total }
	}

	pub fn empty() -> Self {
		Self::new(Vec::new())
	}
}

impl<'de> Deserialize<'de> for BalanceSnapshot {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		#[derive(Deserialize)]
		struct Tokens {
			tokens: Vec<TokenRecord>,
		}

		Tokens::deserialize(deserializer).map(|raw| Self::new(raw.tokens))
	}
}

/// Outcome of fetching balances for every chain of a logical account.
///
/// Every requested chain appears in exactly one of `successes` or `failures`.
/// `total_fiat_value` only counts successful chains.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateBalanceResult {
	pub total_fiat_value: f64,
	pub successes: BTreeMap<ChainId, BalanceSnapshot>,
	pub failures: BTreeMap<ChainId, FetchError>,
}

impl AggregateBalanceResult {
	pub(crate) fn record_success(&mut self, chain_id: ChainId, snapshot: BalanceSnapshot) {
		self.failures.remove(&chain_id);
		self.successes.insert(chain_id, snapshot);
		self.recompute_total();
	}

	pub(crate) fn record_failure(&mut self, chain_id: ChainId, error: FetchError) {
		self.successes.remove(&chain_id);
		self.failures.insert(chain_id, error);
		self.recompute_total();
	}

	fn recompute_total(&mut self) {
		self.total_fiat_value = self.successes.values().map(|s| s.fiat_total).sum();
	}

	pub fn succeeded_chains(&self) -> Vec<ChainId> {
		self.successes.keys().copied().collect()
	}

	pub fn failed_chains(&self) -> Vec<ChainId> {
		self.failures.keys().copied().collect()
	}

	pub fn requested_chains(&self) -> usize {
		self.successes.len() + self.failures.len()
	}

	pub fn is_complete(&self) -> bool {
		self.failures.is_empty()
	}

	/// At least one chain succeeded
	pub fn has_partial_data(&self) -> bool {
		!self.successes.is_empty()
	}

	/// Fold a retry over this result.
	///
	/// Chains covered by `retry` take the retry's outcome; all other chains keep their
	/// previous outcome. The aggregator never does this itself.
	pub fn merge_retry(mut self, retry: AggregateBalanceResult) -> Self {
		for (chain_id, snapshot) in retry.successes {
			self.failures.remove(&chain_id);
			self.successes.insert(chain_id, snapshot);
		}
		for (chain_id, error) in retry.failures {
			self.successes.remove(&chain_id);
			self.failures.insert(chain_id, error);
		}
		self.recompute_total();
		self
	}
}
