//! Reconciliation of the single-chain and multichain active pointers.
//!
//! The two pointers are persisted independently, so they can drift apart while the multichain
//! mode flag is off or while an external writer touches one of them. The synchronizer brings
//! them back in line at well-defined points: when the mode flag is toggled, when `synchronize`
//! is called, and when a selection is made through it. Between those points divergence is
//! tolerated.
//!
//! Each reconciliation reads both pointers, decides and writes one or both, without a
//! transaction. A concurrent writer can make that decision stale.
//!
//! Nothing here returns an error. Resolution misses leave pointers unchanged, and store or
//! account-source failures are logged and reported as `SelectionChange::Degraded`.

use crate::accounts::{AccountSource, Address, ChainAccount, LogicalAccount, find_by_address};
use crate::config::SelectionConfig;
use crate::error::SelectionError;
use crate::selection::pointers::{ActivePointerStore, MultichainPointer, SingleChainPointer};

use futures::Stream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// What a reconciliation or selection did to the pointers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionChange {
	/// Neither pointer was written
	Unchanged,
	/// The multichain pointer now points at `address`
	MultichainUpdated { address: Address },
	/// The single-chain pointer was written
	SingleChainUpdated(SingleChainPointer),
	/// Both pointers were written
	BothUpdated {
		single_chain: SingleChainPointer,
		multichain: Address,
	},
	/// A store or account-source failure stopped the operation part way
	Degraded { reason: String },
}

/// Keeps the active single-chain and multichain selections consistent
pub struct ActiveEntitySynchronizer {
	pointers: ActivePointerStore,
	accounts: Arc<dyn AccountSource>,
	multichain_enabled: AtomicBool,
}

impl ActiveEntitySynchronizer {
	pub fn new(
		pointers: ActivePointerStore,
		accounts: Arc<dyn AccountSource>,
		config: &SelectionConfig,
	) -> Self {
		Self {
			pointers,
			accounts,
			multichain_enabled: AtomicBool::new(config.multichain_enabled),
		}
	}

	pub fn is_multichain_enabled(&self) -> bool {
		self.multichain_enabled.load(Ordering::SeqCst)
	}

	/// Flip the mode flag, then reconcile toward the new mode
	pub async fn toggle_mode(&self, enabled: bool) -> SelectionChange {
		let previous = self.multichain_enabled.swap(enabled, Ordering::SeqCst);
		info!("Multichain mode {} -> {}", previous, enabled);
		self.synchronize(enabled).await
	}

	/// Reconcile the pointers toward the given mode.
	///
	/// Running it twice with no external write in between leaves the same pointers as running
	/// it once.
	pub async fn synchronize(&self, mode_enabled: bool) -> SelectionChange {
		let outcome = if mode_enabled {
			self.toward_multichain().await
		} else {
			self.toward_single_chain().await
		};
		settle("synchronize", outcome)
	}

	/// Explicit pick of a logical account while in multichain mode.
	///
	/// Sets the multichain pointer and points the single-chain pointer at the entity's
	/// lowest chain id.
	pub async fn select_multichain(&self, logical_account: &LogicalAccount) -> SelectionChange {
		settle(
			"select_multichain",
			self.write_multichain_selection(logical_account).await,
		)
	}

	/// Explicit pick of a single chain account.
	///
	/// In multichain mode the multichain pointer follows when the address resolves to a
	/// logical account.
	pub async fn select_single_chain(&self, account: &ChainAccount) -> SelectionChange {
		settle(
			"select_single_chain",
			self.write_single_chain_selection(account).await,
		)
	}

	/// Currently selected logical account, if its pointer is set and still resolves
	pub async fn active_multichain(&self) -> Option<LogicalAccount> {
		match self.pointers.multichain().await {
			Ok(pointer) => self.resolve_pointer(pointer).await,
			Err(e) => {
				warn!("Failed to read multichain pointer: {}", e);
				None
			}
		}
	}

	pub async fn active_single_chain(&self) -> Option<SingleChainPointer> {
		self.pointers
			.single_chain()
			.await
			.map_err(|e| warn!("Failed to read single-chain pointer: {}", e))
			.ok()
			.flatten()
	}

	/// Stream of the resolved multichain selection.
	///
	/// Yields the current value first, then once per change of the pointer. Intermediate
	/// values may be skipped if the consumer falls behind; the latest one is always delivered.
	pub async fn active_multichain_updates(
		&self,
	) -> Result<impl Stream<Item = Option<LogicalAccount>> + '_, SelectionError> {
		let receiver = self.pointers.subscribe_multichain().await?;

		Ok(futures::stream::unfold(
			(receiver, true),
			move |(mut receiver, first)| async move {
				if !first && receiver.changed().await.is_err() {
					return None;
				}
				let raw = receiver.borrow_and_update().clone();
				let resolved = match MultichainPointer::decode(raw.as_deref()) {
					Ok(pointer) => self.resolve_pointer(pointer).await,
					Err(e) => {
						warn!("Ignoring unreadable multichain pointer: {}", e);
						None
					}
				};
				Some((resolved, (receiver, false)))
			},
		))
	}

	async fn toward_multichain(&self) -> Result<SelectionChange, SelectionError> {
		let single_chain = self.pointers.single_chain().await?;
		let multichain = self.pointers.multichain().await?;

		let Some(single_chain) = single_chain else {
			return Ok(SelectionChange::Unchanged);
		};
		if let Some(current) = &multichain {
			if current.address == single_chain.address {
				return Ok(SelectionChange::Unchanged);
			}
			info!(
				"Pointers diverged ({} vs {}), following the single-chain pointer",
				single_chain.address, current.address
			);
		}

		match self.resolve(&single_chain.address).await? {
			Some(logical_account) => {
				self.pointers.set_multichain(&logical_account).await?;
				Ok(SelectionChange::MultichainUpdated {
					address: logical_account.address,
				})
			}
			None => {
				debug!(
					"No logical account for {}, leaving multichain pointer as is",
					single_chain.address
				);
				Ok(SelectionChange::Unchanged)
			}
		}
	}

	async fn toward_single_chain(&self) -> Result<SelectionChange, SelectionError> {
		let single_chain = self.pointers.single_chain().await?;
		if single_chain.is_some() {
			// Set single-chain pointer wins, even when it diverges from the multichain one
			return Ok(SelectionChange::Unchanged);
		}

		let Some(multichain) = self.pointers.multichain().await? else {
			return Ok(SelectionChange::Unchanged);
		};

		let first = self
			.resolve(&multichain.address)
			.await?
			.and_then(|logical_account| logical_account.first_account().cloned());

		match first {
			Some(account) => {
				let pointer = SingleChainPointer::from(&account);
				self.pointers.set_single_chain(&pointer).await?;
				Ok(SelectionChange::SingleChainUpdated(pointer))
			}
			None => {
				debug!(
					"No chain account for {}, leaving single-chain pointer unset",
					multichain.address
				);
				Ok(SelectionChange::Unchanged)
			}
		}
	}

	async fn write_multichain_selection(
		&self,
		logical_account: &LogicalAccount,
	) -> Result<SelectionChange, SelectionError> {
		self.pointers.set_multichain(logical_account).await?;
		let Some(first) = logical_account.first_account() else {
			return Ok(SelectionChange::MultichainUpdated {
				address: logical_account.address.clone(),
			});
		};

		let single_chain = SingleChainPointer::from(first);
		self.pointers.set_single_chain(&single_chain).await?;
		info!(
			"Selected {} ({}) on {} chain(s), single-chain pointer on chain {}",
			logical_account.label,
			logical_account.address,
			logical_account.len(),
			single_chain.chain_id
		);
		Ok(SelectionChange::BothUpdated {
			single_chain,
			multichain: logical_account.address.clone(),
		})
	}

	async fn write_single_chain_selection(
		&self,
		account: &ChainAccount,
	) -> Result<SelectionChange, SelectionError> {
		let single_chain = SingleChainPointer::from(account);
		self.pointers.set_single_chain(&single_chain).await?;

		if !self.is_multichain_enabled() {
			return Ok(SelectionChange::SingleChainUpdated(single_chain));
		}

		match self.resolve(&account.address).await? {
			Some(logical_account) => {
				self.pointers.set_multichain(&logical_account).await?;
				Ok(SelectionChange::BothUpdated {
					single_chain,
					multichain: logical_account.address,
				})
			}
			None => Ok(SelectionChange::SingleChainUpdated(single_chain)),
		}
	}

	async fn resolve(&self, address: &Address) -> Result<Option<LogicalAccount>, SelectionError> {
		let accounts = self.accounts.chain_accounts().await?;
		Ok(find_by_address(&accounts, address))
	}

	async fn resolve_pointer(&self, pointer: Option<MultichainPointer>) -> Option<LogicalAccount> {
		let pointer = pointer?;
		self.resolve(&pointer.address)
			.await
			.map_err(|e| warn!("Failed to resolve {}: {}", pointer.address, e))
			.ok()
			.flatten()
	}
}

fn settle(operation: &str, outcome: Result<SelectionChange, SelectionError>) -> SelectionChange {
	match outcome {
		Ok(change) => {
			debug!("{}: {:?}", operation, change);
			change
		}
		Err(e) => {
			warn!("{} stopped early: {}", operation, e);
			SelectionChange::Degraded {
				reason: e.to_string(),
			}
		}
	}
}
