use crate::accounts::types::ChainAccount;
use crate::error::SourceError;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

/// Source of `ChainAccount` snapshots, typically backed by a remote repository
#[async_trait::async_trait]
pub trait AccountSource: Send + Sync {
	async fn chain_accounts(&self) -> Result<Vec<ChainAccount>, SourceError>;
}

/// In-memory account source whose snapshot can be swapped at runtime
#[derive(Debug, Default)]
pub struct StaticAccountSource {
	accounts: RwLock<Vec<ChainAccount>>,
}

impl StaticAccountSource {
	pub fn new(accounts: Vec<ChainAccount>) -> Self {
		Self {
			accounts: RwLock::new(accounts),
		}
	}

	/// Load a JSON array of accounts from disk
	pub async fn from_file(path: &Path) -> Result<Self, SourceError> {
		let content = tokio::fs::read_to_string(path).await?;
		let accounts: Vec<ChainAccount> = serde_json::from_str(&content).map_err(|e| {
			SourceError::Parse(format!("Failed to parse accounts file {:?}: {}", path, e))
		})?;
		info!("Loaded {} chain accounts from {:?}", accounts.len(), path);
		Ok(Self::new(accounts))
	}

	pub async fn replace(&self, accounts: Vec<ChainAccount>) {
		*self.accounts.write().await = accounts;
	}
}

#[async_trait::async_trait]
impl AccountSource for StaticAccountSource {
	async fn chain_accounts(&self) -> Result<Vec<ChainAccount>, SourceError> {
		Ok(self.accounts.read().await.clone())
	}
}
