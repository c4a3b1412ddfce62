//! Account types: per-chain deployment records and their multichain grouping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Numeric chain identifier (EIP-155 style)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<u64> for ChainId {
	fn from(value: u64) -> Self {
		Self(value)
	}
}

/// Hex account or contract address, normalised to trimmed lowercase.
///
/// Two addresses that differ only in checksum casing compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
	pub fn new(raw: impl AsRef<str>) -> Self {
		Self(raw.as_ref().trim().to_ascii_lowercase())
	}

	/// The sentinel address used for a chain's native currency
	pub fn zero() -> Self {
		Self(format!("0x{}", "0".repeat(40)))
	}

	/// True for `0x` followed only by zeros, whatever the length
	pub fn is_zero(&self) -> bool {
		let digits = self.0.strip_prefix("0x").unwrap_or(&self.0);
		!digits.is_empty() && digits.bytes().all(|b| b == b'0')
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<String> for Address {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

impl From<&str> for Address {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl From<Address> for String {
	fn from(value: Address) -> Self {
		value.0
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// One deployment of a wallet on one chain.
///
/// Snapshots are owned by the account source and never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainAccount {
	pub address: Address,
	pub chain_id: ChainId,
	pub label: String,
}

impl ChainAccount {
	pub fn new(address: impl Into<Address>, chain_id: u64, label: impl Into<String>) -> Self {
		Self {
			address: address.into(),
			chain_id: ChainId(chain_id),
			label: label.into(),
		}
	}
}

/// All deployments of one address, keyed by chain.
///
/// Derived on demand from `ChainAccount` snapshots and never persisted. Every
/// value in `accounts` shares `address`, and there is at most one account per
/// chain. The map is ordered, so the "first" chain is always the lowest chain id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalAccount {
	pub address: Address,
	pub label: String,
	accounts: BTreeMap<ChainId, ChainAccount>,
}

impl LogicalAccount {
	/// Start a group from the first account seen for an address
	pub(crate) fn from_first(account: ChainAccount) -> Self {
		let mut accounts = BTreeMap::new();
		let address = account.address.clone();
		let label = account.label.clone();
		accounts.insert(account.chain_id, account);
		Self {
			address,
			label,
			accounts,
		}
	}

	/// Add an account to the group, returning the one it replaced on the same chain
	pub(crate) fn insert(&mut self, account: ChainAccount) -> Option<ChainAccount> {
		debug_assert_eq!(account.address, self.address);
		self.accounts.insert(account.chain_id, account)
	}

	pub fn accounts(&self) -> &BTreeMap<ChainId, ChainAccount> {
		&self.accounts
	}

	pub fn chain_ids(&self) -> impl Iterator<Item = ChainId> + '_ {
		self.accounts.keys().copied()
	}

	pub fn account_for(&self, chain_id: ChainId) -> Option<&ChainAccount> {
		self.accounts.get(&chain_id)
	}

	/// Default single-chain pick for this entity: the lowest chain id
	pub fn first_account(&self) -> Option<&ChainAccount> {
		self.accounts.values().next()
	}

	pub fn len(&self) -> usize {
		self.accounts.len()
	}

	pub fn is_empty(&self) -> bool {
		self.accounts.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_address_normalisation() {
		assert_eq!(Address::new(" 0xABCdef "), Address::new("0xabcdef"));
		assert_eq!(Address::new("0xABC").as_str(), "0xabc");
	}

	#[test]
	fn test_zero_address_detection() {
		assert!(Address::zero().is_zero());
		assert!(Address::new("0x0").is_zero());
		assert!(Address::new("0x0000").is_zero());
		assert!(!Address::new("0x").is_zero());
		assert!(!Address::new("0x0001").is_zero());
	}

	#[test]
	fn test_address_serde_normalises() {
		let address: Address = serde_json::from_str("\"0xDEAD\"").unwrap();
		assert_eq!(address.as_str(), "0xdead");
		assert_eq!(serde_json::to_string(&address).unwrap(), "\"0xdead\"");
	}

	#[test]
	fn test_first_account_is_lowest_chain() {
		let mut logical = LogicalAccount::from_first(ChainAccount::new("0xa", 137, "Main"));
		logical.insert(ChainAccount::new("0xa", 1, "Main"));
		assert_eq!(logical.first_account().unwrap().chain_id, ChainId(1));
		assert_eq!(logical.chain_ids().collect::<Vec<_>>(), vec![ChainId(1), ChainId(137)]);
	}

	#[test]
	fn test_chain_account_wire_format() {
		let account: ChainAccount =
			serde_json::from_str(r#"{"address": "0xAB", "chainId": 137, "label": "Main"}"#).unwrap();

		assert_eq!(account, ChainAccount::new("0xab", 137, "Main"));
		assert_eq!(
			serde_json::to_string(&account).unwrap(),
			r#"{"address":"0xab","chainId":137,"label":"Main"}"#
		);
	}
}
