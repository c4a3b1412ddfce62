//! Typed access to the two persisted active-selection pointers.
//!
//! The single-chain pointer and the multichain pointer live under separate keys and are read
//! and written independently. There is no transaction spanning both keys.

use crate::accounts::{Address, ChainAccount, ChainId, LogicalAccount};
use crate::error::StoreError;
use crate::selection::store::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

pub const SINGLE_CHAIN_KEY: &str = "active_single_chain_account";
pub const MULTICHAIN_KEY: &str = "active_multichain_account";

/// Legacy selection: one account on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleChainPointer {
	pub chain_id: ChainId,
	pub address: Address,
}

impl From<&ChainAccount> for SingleChainPointer {
	fn from(account: &ChainAccount) -> Self {
		Self {
			chain_id: account.chain_id,
			address: account.address.clone(),
		}
	}
}

/// Multichain selection: one address, resolved to a `LogicalAccount` on read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultichainPointer {
	pub address: Address,
}

impl MultichainPointer {
	/// Decode a raw stored value, as delivered by a store subscription
	pub fn decode(raw: Option<&str>) -> Result<Option<Self>, StoreError> {
		raw.map(serde_json::from_str).transpose().map_err(Into::into)
	}
}

/// Facade over a `KeyValueStore` holding both pointers
#[derive(Clone)]
pub struct ActivePointerStore {
	store: Arc<dyn KeyValueStore>,
}

impl ActivePointerStore {
	pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
		Self { store }
	}

	pub async fn single_chain(&self) -> Result<Option<SingleChainPointer>, StoreError> {
		self.store
			.get(SINGLE_CHAIN_KEY)
			.await?
			.map(|raw| serde_json::from_str(&raw))
			.transpose()
			.map_err(Into::into)
	}

	pub async fn set_single_chain(&self, pointer: &SingleChainPointer) -> Result<(), StoreError> {
		self.store
			.set(SINGLE_CHAIN_KEY, serde_json::to_string(pointer)?)
			.await
	}

	pub async fn clear_single_chain(&self) -> Result<(), StoreError> {
		self.store.remove(SINGLE_CHAIN_KEY).await
	}

	pub async fn multichain(&self) -> Result<Option<MultichainPointer>, StoreError> {
		let raw = self.store.get(MULTICHAIN_KEY).await?;
		MultichainPointer::decode(raw.as_deref())
	}

	pub async fn set_multichain(&self, logical_account: &LogicalAccount) -> Result<(), StoreError> {
		let pointer = MultichainPointer {
			address: logical_account.address.clone(),
		};
		self.store
			.set(MULTICHAIN_KEY, serde_json::to_string(&pointer)?)
			.await
	}

	pub async fn clear_multichain(&self) -> Result<(), StoreError> {
		self.store.remove(MULTICHAIN_KEY).await
	}

	/// Raw change feed of the multichain pointer
	pub async fn subscribe_multichain(&self) -> Result<watch::Receiver<Option<String>>, StoreError> {
		self.store.subscribe(MULTICHAIN_KEY).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::accounts::build_all;
	use crate::selection::store::InMemoryKeyValueStore;

	#[tokio::test]
	async fn test_pointers_are_independent() {
		let pointers = ActivePointerStore::new(Arc::new(InMemoryKeyValueStore::new()));
		let accounts = vec![ChainAccount::new("0xa", 1, "Main"), ChainAccount::new("0xa", 10, "Main")];
		let logical = build_all(&accounts).remove(0);

		pointers
			.set_single_chain(&SingleChainPointer::from(&accounts[1]))
			.await
			.unwrap();
		assert!(pointers.multichain().await.unwrap().is_none());

		pointers.set_multichain(&logical).await.unwrap();
		pointers.clear_single_chain().await.unwrap();

		assert!(pointers.single_chain().await.unwrap().is_none());
		assert_eq!(
			pointers.multichain().await.unwrap(),
			Some(MultichainPointer {
				address: Address::new("0xa")
			})
		);
	}

	#[tokio::test]
	async fn test_corrupt_pointer_is_an_error() {
		let store = Arc::new(InMemoryKeyValueStore::new());
		store
			.set(SINGLE_CHAIN_KEY, "not json".to_string())
			.await
			.unwrap();

		let pointers = ActivePointerStore::new(store);

		assert!(matches!(
			pointers.single_chain().await,
			Err(StoreError::Serialization(_))
		));
	}
}
