//! Persistent key-value storage
//!
//! Mirrors the extension storage area: JSON values under string keys.
//! Calls are asynchronous and are the points where other handlers may run.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StorageError;

#[async_trait]
pub trait RuleStorage: Send + Sync {
    /// Value under `key`, or `None` if never set.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
}

// =============================================================================
// Memory Storage
// =============================================================================

/// Volatile storage for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let values = self
            .values
            .lock()
            .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

// =============================================================================
// JSON File Storage
// =============================================================================

/// All keys in one JSON object on disk.
///
/// Writes go to a sibling temp file that is then renamed over the
/// original, so a crash never leaves a half-written file.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StorageError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&text)? {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::Backend(format!(
                "'{}' does not contain a JSON object",
                self.path.display()
            ))),
        }
    }
}

#[async_trait]
impl RuleStorage for JsonFileStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let mut all = self.read_all().await?;
        all.insert(key.to_string(), value);
        let text = serde_json::to_string_pretty(&Value::Object(all))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("k").await.unwrap(), None);
        storage.set("k", json!([1, 2])).await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_file_storage_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("nested").join("storage.json"));

        assert_eq!(storage.get("interzept-rules").await.unwrap(), None);
        storage.set("interzept-rules", json!([{"id": "1"}])).await.unwrap();
        storage.set("interzept-enabled", json!(false)).await.unwrap();

        let reopened = JsonFileStorage::new(storage.path().to_path_buf());
        assert_eq!(reopened.get("interzept-rules").await.unwrap(), Some(json!([{"id": "1"}])));
        assert_eq!(reopened.get("interzept-enabled").await.unwrap(), Some(json!(false)));
    }

    #[tokio::test]
    async fn test_file_storage_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let storage = JsonFileStorage::new(path);
        assert!(matches!(storage.get("k").await, Err(StorageError::Backend(_))));
    }
}
