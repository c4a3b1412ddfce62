//! Grouping of flat per-chain account records into logical multichain accounts.
//!
//! Accounts sharing an address are treated as the same wallet deployed on several chains.
//! The label of a group is taken from the first account seen for its address; labels are
//! assumed to be identical across chains and this is not checked.

use crate::accounts::types::{Address, ChainAccount, LogicalAccount};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::debug;

/// Group every account by address, ordered by label ascending.
///
/// Groups with equal labels keep the order in which their address was first seen.
pub fn build_all(accounts: &[ChainAccount]) -> Vec<LogicalAccount> {
	let mut positions: HashMap<&Address, usize> = HashMap::new();
	let mut groups: Vec<LogicalAccount> = Vec::new();

	for account in accounts {
		match positions.get(&account.address) {
			Some(&position) => push_into(&mut groups[position], account),
			None => {
				positions.insert(&account.address, groups.len());
				groups.push(LogicalAccount::from_first(account.clone()));
			}
		}
	}

	groups
		.into_iter()
		.sorted_by(|a, b| a.label.cmp(&b.label))
		.collect()
}

/// Group only the accounts deployed at `address`.
///
/// Returns `None` when no account matches; that is a normal outcome.
pub fn find_by_address(accounts: &[ChainAccount], address: &Address) -> Option<LogicalAccount> {
	let mut matching = accounts.iter().filter(|account| &account.address == address);
	let mut logical = LogicalAccount::from_first(matching.next()?.clone());
	for account in matching {
		push_into(&mut logical, account);
	}
	Some(logical)
}

fn push_into(logical: &mut LogicalAccount, account: &ChainAccount) {
	if let Some(replaced) = logical.insert(account.clone()) {
		debug!(
			"Account {} has more than one record on chain {}, keeping the last one (dropped label '{}')",
			account.address, account.chain_id, replaced.label
		);
	}
}
