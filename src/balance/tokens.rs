//! Cross-chain token identity.
//!
//! Tokens from different chains are merged into one row when they share a canonical key.
//! Native currencies are keyed by symbol, so two chains' native coins stay apart even though
//! both report the sentinel zero address. Contract tokens are keyed by contract address alone,
//! which assumes the same address never denotes unrelated tokens on different chains.

use crate::accounts::ChainId;
use crate::balance::types::{BalanceSnapshot, TokenKind, TokenRecord};
use std::collections::HashMap;
use tracing::warn;

const NATIVE_PREFIX: &str = "NATIVE_";
const CONTRACT_PREFIX: &str = "ERC20_";

/// Deduplication key for a token across chains
pub fn canonical_key(token: &TokenRecord) -> String {
	if token.is_native() {
		format!("{}{}", NATIVE_PREFIX, token.symbol.to_uppercase())
	} else {
		format!("{}{}", CONTRACT_PREFIX, token.contract_address.as_str())
	}
}

/// Holdings of one economic asset across chains.
///
/// Metadata comes from the first occurrence seen while grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGroup {
	pub key: String,
	pub symbol: String,
	pub name: Option<String>,
	pub decimals: u32,
	pub kind: TokenKind,
	pub logo_url: Option<String>,
	pub entries: Vec<(ChainId, TokenRecord)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenTotals {
	/// Sum of raw quantities; decimals are assumed identical within a group
	pub total_quantity: u128,
	pub total_fiat_value: f64,
	/// The raw sum exceeded `u128::MAX`; `total_quantity` holds the maximum instead
	pub quantity_overflowed: bool,
}

impl TokenGroup {
	fn from_first(key: String, chain_id: ChainId, token: &TokenRecord) -> Self {
		Self {
			key,
			symbol: token.symbol.clone(),
			name: token.name.clone(),
			decimals: token.decimals,
			kind: if token.is_native() {
				TokenKind::Native
			} else {
				TokenKind::Contract
			},
			logo_url: token.logo_url.clone(),
			entries: vec![(chain_id, token.clone())],
		}
	}

	pub fn is_native(&self) -> bool {
		self.kind == TokenKind::Native
	}

	pub fn chains(&self) -> impl Iterator<Item = ChainId> + '_ {
		self.entries.iter().map(|(chain_id, _)| *chain_id)
	}

	pub fn aggregate(&self) -> TokenTotals {
		let mut totals = TokenTotals {
			total_quantity: 0,
			total_fiat_value: 0.0,
			quantity_overflowed: false,
		};
		for (chain_id, token) in &self.entries {
			totals.total_fiat_value += token.fiat_value;
			if totals.quantity_overflowed {
				continue;
			}
			match totals.total_quantity.checked_add(token.raw_quantity) {
				Some(sum) => totals.total_quantity = sum,
				None => {
					warn!(
						"Quantity of {} overflowed while adding chain {}, clamping total",
						self.key, chain_id
					);
					totals.total_quantity = u128::MAX;
					totals.quantity_overflowed = true;
				}
			}
		}
		totals
	}

	/// Symbol for native currencies; first non-empty declared name for contract tokens,
	/// falling back to the symbol.
	pub fn display_name(&self) -> &str {
		if self.is_native() {
			return &self.symbol;
		}
		self.entries
			.iter()
			.filter_map(|(_, token)| token.name.as_deref())
			.find(|name| !name.trim().is_empty())
			.unwrap_or(&self.symbol)
	}
}

/// Group tokens from several chains by canonical key.
///
/// Chains are visited in the order given, and tokens within a chain in snapshot order.
/// Groups are returned in the order their key was first seen.
pub fn group_across_chains<'a>(
	balances_by_chain: impl IntoIterator<Item = (&'a ChainId, &'a BalanceSnapshot)>,
) -> Vec<TokenGroup> {
	let mut positions: HashMap<String, usize> = HashMap::new();
	let mut groups: Vec<TokenGroup> = Vec::new();

	for (chain_id, snapshot) in balances_by_chain {
		for token in &snapshot.tokens {
			let key = canonical_key(token);
			match positions.get(&key) {
				Some(&position) => groups[position].entries.push((*chain_id, token.clone())),
				None => {
					positions.insert(key.clone(), groups.len());
					groups.push(TokenGroup::from_first(key, *chain_id, token));
				}
			}
		}
	}

	groups
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::accounts::Address;
	use std::collections::BTreeMap;

	fn contract(address: &str, symbol: &str, name: Option<&str>, quantity: u128, fiat: f64) -> TokenRecord {
		TokenRecord {
			contract_address: Address::new(address),
			symbol: symbol.to_string(),
			name: name.map(str::to_string),
			decimals: 6,
			raw_quantity: quantity,
			fiat_value: fiat,
			kind: TokenKind::Contract,
			logo_url: None,
		}
	}

	fn native(symbol: &str, quantity: u128, fiat: f64) -> TokenRecord {
		TokenRecord {
			contract_address: Address::zero(),
			symbol: symbol.to_string(),
			name: Some(format!("{symbol} coin")),
			decimals: 18,
			raw_quantity: quantity,
			fiat_value: fiat,
			kind: TokenKind::Native,
			logo_url: None,
		}
	}

	fn balances(entries: Vec<(u64, Vec<TokenRecord>)>) -> BTreeMap<ChainId, BalanceSnapshot> {
		entries
			.into_iter()
			.map(|(chain, tokens)| (ChainId(chain), BalanceSnapshot::new(tokens)))
			.collect()
	}

	#[test]
	fn test_quantity_overflow_is_flagged() {
		let balances = balances(vec![
			(1, vec![contract("0xabc", "USDC", None, u128::MAX - 1, 1.0)]),
			(10, vec![contract("0xabc", "USDC", None, 5, 2.0)]),
		]);

		let totals = group_across_chains(&balances)[0].aggregate();

		assert!(totals.quantity_overflowed);
		assert_eq!(totals.total_quantity, u128::MAX);
		assert_eq!(totals.total_fiat_value, 3.0);
	}

	#[test]
	fn test_canonical_keys() {
		assert_eq!(canonical_key(&native("eth", 1, 0.0)), "NATIVE_ETH");
		assert_eq!(
			canonical_key(&contract("0xABC", "USDC", None, 1, 0.0)),
			"ERC20_0xabc"
		);

		let mut declared_native = contract("0x1234", "pol", None, 1, 0.0);
		declared_native.kind = TokenKind::Native;
		assert_eq!(canonical_key(&declared_native), "NATIVE_POL");
	}

	#[test]
	fn test_same_contract_merges_across_chains() {
		let balances = balances(vec![
			(1, vec![contract("0xABC", "USDC", None, 10, 5.0)]),
			(137, vec![contract("0xabc", "USDC", None, 20, 8.0)]),
		]);

		let groups = group_across_chains(&balances);

		assert_eq!(groups.len(), 1);
		let totals = groups[0].aggregate();
		assert_eq!(totals.total_quantity, 30);
		assert_eq!(totals.total_fiat_value, 13.0);
		assert_eq!(groups[0].chains().collect::<Vec<_>>(), vec![ChainId(1), ChainId(137)]);
	}

	#[test]
	fn test_distinct_native_currencies_stay_apart() {
		let balances = balances(vec![
			(1, vec![native("ETH", 1, 3000.0)]),
			(137, vec![native("POL", 5, 2.0)]),
		]);

		let groups = group_across_chains(&balances);

		assert_eq!(groups.len(), 2);
		assert_eq!(groups[0].key, "NATIVE_ETH");
		assert_eq!(groups[1].key, "NATIVE_POL");
	}

	#[test]
	fn test_same_native_symbol_merges() {
		let balances = balances(vec![
			(1, vec![native("ETH", 1, 10.0)]),
			(10, vec![native("eth", 2, 20.0)]),
		]);

		let groups = group_across_chains(&balances);

		assert_eq!(groups.len(), 1);
		assert_eq!(groups[0].aggregate().total_quantity, 3);
		assert_eq!(groups[0].symbol, "ETH");
	}

	#[test]
	fn test_first_occurrence_provides_metadata() {
		let mut first = contract("0xabc", "USDC", Some("USD Coin"), 1, 1.0);
		first.logo_url = Some("https://logo/usdc.png".to_string());
		let mut second = contract("0xabc", "USDC.e", Some("Bridged USDC"), 1, 1.0);
		second.decimals = 18;
		let balances = balances(vec![(1, vec![first]), (137, vec![second])]);

		let group = group_across_chains(&balances).remove(0);

		assert_eq!(group.symbol, "USDC");
		assert_eq!(group.decimals, 6);
		assert_eq!(group.logo_url.as_deref(), Some("https://logo/usdc.png"));
		assert_eq!(group.display_name(), "USD Coin");
	}

	#[test]
	fn test_display_name_fallbacks() {
		let balances = balances(vec![
			(1, vec![contract("0xabc", "DAI", Some("  "), 1, 1.0), native("ETH", 1, 1.0)]),
			(10, vec![contract("0xabc", "DAI", Some("Dai Stablecoin"), 1, 1.0)]),
			(137, vec![contract("0xdef", "WBTC", None, 1, 1.0)]),
		]);

		let groups = group_across_chains(&balances);

		assert_eq!(groups[0].display_name(), "Dai Stablecoin");
		assert_eq!(groups[1].display_name(), "ETH");
		assert_eq!(groups[2].display_name(), "WBTC");
	}
}
