use crate::accounts::{ChainAccount, LogicalAccount};
use crate::balance::AggregateBalanceResult;
use crate::error::{FetchError, SelectionError};
use tracing::debug;

/// How the UI should recover from a failed balance load
#[derive(Debug, Clone, PartialEq)]
pub enum BalanceRecovery {
	RetryWithLongerTimeout,
	CheckNetworkConnection,
	/// Render what succeeded and flag the rest
	ShowPartialData(AggregateBalanceResult),
	FallbackToSingleChain,
}

impl BalanceRecovery {
	pub fn tag(&self) -> &'static str {
		match self {
			BalanceRecovery::RetryWithLongerTimeout => "retry_with_longer_timeout",
			BalanceRecovery::CheckNetworkConnection => "check_network_connection",
			BalanceRecovery::ShowPartialData(_) => "show_partial_data",
			BalanceRecovery::FallbackToSingleChain => "fallback_to_single_chain",
		}
	}
}

/// How the UI should recover from a failed selection
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionRecovery {
	UseFallbackAccount(ChainAccount),
	DisableMultichainMode,
	ShowErrorToUser(String),
}

/// Classify a balance failure for `logical_account`.
///
/// Timeouts come first, then connectivity errors; anything else shows partial data when at
/// least one chain succeeded and falls back to single-chain otherwise.
pub fn classify_balance_error(
	logical_account: &LogicalAccount,
	error: &FetchError,
	partial_result: Option<&AggregateBalanceResult>,
) -> BalanceRecovery {
	let recovery = if error.is_timeout() {
		BalanceRecovery::RetryWithLongerTimeout
	} else if error.is_connectivity() {
		BalanceRecovery::CheckNetworkConnection
	} else {
		match partial_result {
			Some(partial) if partial.has_partial_data() => {
				BalanceRecovery::ShowPartialData(partial.clone())
			}
			_ => BalanceRecovery::FallbackToSingleChain,
		}
	};

	debug!(
		"Balance error for {} ({}) classified as {}",
		logical_account.address,
		error,
		recovery.tag()
	);
	recovery
}

/// Classify a selection failure.
///
/// A fallback account always wins; otherwise multichain mode is switched off if it is on, and
/// the error is surfaced as-is when it is already off.
pub fn classify_selection_error(
	error: &SelectionError,
	fallback_account: Option<&ChainAccount>,
	multichain_enabled: bool,
) -> SelectionRecovery {
	match fallback_account {
		Some(account) => SelectionRecovery::UseFallbackAccount(account.clone()),
		None if multichain_enabled => SelectionRecovery::DisableMultichainMode,
		None => SelectionRecovery::ShowErrorToUser(error.to_string()),
	}
}
