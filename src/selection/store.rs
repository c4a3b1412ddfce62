use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, RwLock, watch};
use tracing::{debug, info};

/// Persisted key-value store with per-key change notification
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
	async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
	async fn remove(&self, key: &str) -> Result<(), StoreError>;

	/// Watch a key. The receiver holds the current value immediately and every later one.
	async fn subscribe(&self, key: &str) -> Result<watch::Receiver<Option<String>>, StoreError>;
}

/// Per-key watch channels shared by the store implementations.
///
/// Publishing creates the channel if needed, so a subscriber racing the first write still
/// observes it. `send_replace` never waits on receivers.
#[derive(Debug, Default)]
struct ChangeNotifier {
	channels: Mutex<HashMap<String, watch::Sender<Option<String>>>>,
}

impl ChangeNotifier {
	fn publish(&self, key: &str, value: Option<String>) {
		let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
		match channels.get(key) {
			Some(sender) => {
				sender.send_replace(value);
			}
			None => {
				channels.insert(key.to_string(), watch::channel(value).0);
			}
		}
	}

	fn subscribe(&self, key: &str, current: Option<String>) -> watch::Receiver<Option<String>> {
		let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
		channels
			.entry(key.to_string())
			.or_insert_with(|| watch::channel(current).0)
			.subscribe()
	}
}

fn validate_key(key: &str) -> Result<(), StoreError> {
	let valid = !key.is_empty()
		&& key
			.bytes()
			.all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
	if valid {
		Ok(())
	} else {
		Err(StoreError::InvalidKey(key.to_string()))
	}
}

/// Volatile store, used for tests and for running without a data directory
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
	values: RwLock<HashMap<String, String>>,
	notifier: ChangeNotifier,
}

impl InMemoryKeyValueStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		validate_key(key)?;
		Ok(self.values.read().await.get(key).cloned())
	}

	async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
		validate_key(key)?;
		let mut values = self.values.write().await;
		values.insert(key.to_string(), value.clone());
		self.notifier.publish(key, Some(value));
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		validate_key(key)?;
		let mut values = self.values.write().await;
		if values.remove(key).is_some() {
			self.notifier.publish(key, None);
		}
		Ok(())
	}

	async fn subscribe(&self, key: &str) -> Result<watch::Receiver<Option<String>>, StoreError> {
		validate_key(key)?;
		let values = self.values.read().await;
		Ok(self.notifier.subscribe(key, values.get(key).cloned()))
	}
}

/// On-disk record of one key
#[derive(Debug, Serialize, Deserialize)]
struct StoredValue {
	value: String,
	updated_at: String,
}

/// File-based store keeping one JSON file per key under a data directory.
///
/// Writes to one key are serialized, and each write goes through its own temp file, so the
/// value published to subscribers is always the value left on disk.
#[derive(Debug)]
pub struct FileKeyValueStore {
	data_dir: PathBuf,
	notifier: ChangeNotifier,
	key_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl FileKeyValueStore {
	pub fn new(data_dir: PathBuf) -> Self {
		Self {
			data_dir,
			notifier: ChangeNotifier::default(),
			key_locks: Mutex::new(HashMap::new()),
		}
	}

	fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
		let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
		locks.entry(key.to_string()).or_default().clone()
	}

	fn get_filename(&self, key: &str) -> PathBuf {
		self.data_dir.join(format!("{}.json", key))
	}

	async fn read_value(&self, key: &str) -> Result<Option<String>, StoreError> {
		let filename = self.get_filename(key);
		let content = match tokio::fs::read_to_string(&filename).await {
			Ok(content) => content,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		};
		let stored: StoredValue = serde_json::from_str(&content)?;
		Ok(Some(stored.value))
	}
}

#[async_trait::async_trait]
impl KeyValueStore for FileKeyValueStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		validate_key(key)?;
		self.read_value(key).await
	}

	async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
		validate_key(key)?;
		let lock = self.key_lock(key);
		let _guard = lock.lock().await;
		tokio::fs::create_dir_all(&self.data_dir).await?;

		let stored = StoredValue {
			value,
			updated_at: chrono::Utc::now().to_rfc3339(),
		};
		let filename = self.get_filename(key);
		let temp_path = tempfile::Builder::new()
			.prefix(&format!("{}.", key))
			.suffix(".json.tmp")
			.tempfile_in(&self.data_dir)?
			.into_temp_path();
		tokio::fs::write(&temp_path, serde_json::to_string_pretty(&stored)?).await?;
		temp_path.persist(&filename).map_err(|e| e.error)?;

		debug!("Saved store key '{}' to {:?}", key, filename);
		self.notifier.publish(key, Some(stored.value));
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		validate_key(key)?;
		let lock = self.key_lock(key);
		let _guard = lock.lock().await;
		let filename = self.get_filename(key);
		match tokio::fs::remove_file(&filename).await {
			Ok(()) => {
				info!("Removed store key '{}' ({:?})", key, filename);
				self.notifier.publish(key, None);
				Ok(())
			}
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	async fn subscribe(&self, key: &str) -> Result<watch::Receiver<Option<String>>, StoreError> {
		validate_key(key)?;
		let lock = self.key_lock(key);
		let _guard = lock.lock().await;
		let current = self.read_value(key).await?;
		Ok(self.notifier.subscribe(key, current))
	}
}
