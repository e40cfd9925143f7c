//! Per-device log collection at `FireLog/FireLogDetail/{deviceId}`.
//!
//! Entries are keyed by push keys, so the collection orders by creation
//! time. The running total on the device record is not maintained here;
//! callers pair `append` with an increment and `clear` with a reset.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::FireLogError;
use crate::model::{LogEntry, LogId};
use crate::store::{log_detail_path, RemoteStore};

#[derive(Clone)]
pub struct LogStore {
    store: Arc<dyn RemoteStore>,
}

impl LogStore {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Write `entry` under a freshly minted key and return that key.
    ///
    /// # Errors
    ///
    /// Returns `KeyGenerationFailed` without writing anything if no key can
    /// be minted.
    pub async fn append(&self, device_id: &str, mut entry: LogEntry) -> Result<LogId, FireLogError> {
        let collection = log_detail_path(device_id)?;
        let log_id = self.store.mint_key(&collection)?;
        entry.log_id = log_id.clone();

        let value = serde_json::to_value(&entry)?;
        self.store.set(&collection.child(&log_id)?, value).await?;
        debug!(device_id = %device_id, log_id = %log_id, "Appended log entry");
        Ok(log_id)
    }

    /// Remove every entry for the device in one write.
    pub async fn clear(&self, device_id: &str) -> Result<(), FireLogError> {
        let collection = log_detail_path(device_id)?;
        self.store.remove(&collection).await?;
        debug!(device_id = %device_id, "Cleared log entries");
        Ok(())
    }

    /// All entries for the device, oldest first.
    ///
    /// Entries that fail to decode are skipped with a warning.
    pub async fn list(&self, device_id: &str) -> Result<Vec<LogEntry>, FireLogError> {
        let collection = log_detail_path(device_id)?;
        let Some(Value::Object(children)) = self.store.get(&collection).await? else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<LogEntry> = children
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value::<LogEntry>(value) {
                Ok(mut entry) => {
                    if entry.log_id.is_empty() {
                        entry.log_id = key;
                    }
                    Some(entry)
                }
                Err(e) => {
                    warn!(device_id = %device_id, log_id = %key, error = %e, "Skipping undecodable log entry");
                    None
                }
            })
            .collect();
        entries.sort_by(|a, b| a.log_id.cmp(&b.log_id));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use crate::store::memory::InMemoryStore;
    use std::collections::HashSet;

    fn setup() -> (Arc<InMemoryStore>, LogStore) {
        let memory = Arc::new(InMemoryStore::new());
        let store = LogStore::new(memory.clone());
        (memory, store)
    }

    fn entry(message: &str) -> LogEntry {
        LogEntry::new("fid-1", Severity::Info, "Dispenser", "vend", message, "")
    }

    #[tokio::test]
    async fn test_append_returns_stored_key() {
        let (_, store) = setup();
        let log_id = store.append("fid-1", entry("first")).await.unwrap();

        let entries = store.list("fid-1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].log_id, log_id);
        assert_eq!(entries[0].message, "first");
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_key() {
        let (_, store) = setup();
        let mut ids = Vec::new();
        for i in 0..10 {
            ids.push(store.append("fid-1", entry(&format!("m{}", i))).await.unwrap());
        }

        let entries = store.list("fid-1").await.unwrap();
        let listed: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("m{}", i)).collect();
        assert_eq!(listed, expected.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 10);
    }

    #[tokio::test]
    async fn test_key_generation_failure_writes_nothing() {
        let (memory, store) = setup();
        store.append("fid-1", entry("kept")).await.unwrap();

        memory.set_fail_key_generation(true);
        let err = store.append("fid-1", entry("dropped")).await.unwrap_err();
        assert!(matches!(err, FireLogError::KeyGenerationFailed(_)));

        let entries = store.list("fid-1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "kept");
    }

    #[tokio::test]
    async fn test_clear_removes_collection_only() {
        let (_, store) = setup();
        store.append("fid-1", entry("a")).await.unwrap();
        store.append("fid-2", entry("b")).await.unwrap();

        store.clear("fid-1").await.unwrap();
        assert!(store.list("fid-1").await.unwrap().is_empty());
        assert_eq!(store.list("fid-2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_skips_malformed_entries() {
        let (memory, store) = setup();
        store.append("fid-1", entry("good")).await.unwrap();
        let bad = log_detail_path("fid-1").unwrap().child("-bad").unwrap();
        memory
            .set(&bad, serde_json::json!({ "logType": "WARN" }))
            .await
            .unwrap();

        let entries = store.list("fid-1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "good");
    }
}
