//! Configuration for aggregation and selection.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default per-chain fetch bound
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Configuration for balance aggregation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
	/// Time bound applied to each chain fetch independently
	#[serde(rename = "fetch_timeout_ms", deserialize_with = "millis::deserialize")]
	pub fetch_timeout: Duration,
	/// Fiat currency balances are valued in
	pub fiat_code: String,
	/// Log a progress line every N completed chains
	pub progress_log_interval: usize,
}

impl Default for AggregatorConfig {
	fn default() -> Self {
		Self {
			fetch_timeout: DEFAULT_FETCH_TIMEOUT,
			fiat_code: "USD".to_string(),
			progress_log_interval: 1,
		}
	}
}

/// Configuration for active-selection handling
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
	/// Initial state of the multichain mode flag
	pub multichain_enabled: bool,
	/// Directory for the file-backed pointer store; in-memory when unset
	pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
	pub aggregator: AggregatorConfig,
	pub selection: SelectionConfig,
	/// REST balance backend; fixture data is used when unset
	pub provider_base_url: Option<String>,
}

impl AppConfig {
	pub async fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path).await?;
		Ok(serde_json::from_str(&content)?)
	}
}

mod millis {
	use serde::{Deserialize, Deserializer};
	use std::time::Duration;

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = AppConfig::default();
		assert_eq!(config.aggregator.fetch_timeout, Duration::from_secs(30));
		assert_eq!(config.aggregator.fiat_code, "USD");
		assert!(!config.selection.multichain_enabled);
		assert!(config.provider_base_url.is_none());
	}

	#[test]
	fn test_partial_json_keeps_defaults() {
		let config: AppConfig = serde_json::from_str(
			r#"{"aggregator": {"fetch_timeout_ms": 5000}, "selection": {"multichain_enabled": true}}"#,
		)
		.unwrap();

		assert_eq!(config.aggregator.fetch_timeout, Duration::from_secs(5));
		assert_eq!(config.aggregator.fiat_code, "USD");
		assert!(config.selection.multichain_enabled);
	}

	#[tokio::test]
	async fn test_load_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		tokio::fs::write(&path, r#"{"aggregator": {"fiat_code": "EUR"}, "provider_base_url": "http://localhost:8080"}"#)
			.await
			.unwrap();

		let config = AppConfig::load(&path).await.unwrap();

		assert_eq!(config.aggregator.fiat_code, "EUR");
		assert_eq!(config.aggregator.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
		assert_eq!(config.provider_base_url.as_deref(), Some("http://localhost:8080"));
	}

	#[tokio::test]
	async fn test_load_missing_file_is_io_error() {
		let dir = tempfile::tempdir().unwrap();

		let result = AppConfig::load(&dir.path().join("missing.json")).await;

		assert!(matches!(result, Err(ConfigError::Io(_))));
	}
}
