//! Durable key-value storage backed by a single JSON object file.
//!
//! Every write rewrites the whole file through a temporary sibling and a rename, so a
//! crash never leaves a half-written file behind.

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{KeyValueStorage, StorageError};

/// JSON-file backed storage.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| StorageError::Corrupted(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StorageError::Io(format!("{}: {}", self.path.display(), e))),
        }
    }

    async fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let contents =
            serde_json::to_string_pretty(entries).map_err(|e| StorageError::Io(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl KeyValueStorage for JsonFileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        let entries = self.read_all().await?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value);
        self.write_all(&entries).await?;
        tracing::debug!("Stored key '{}' in {}", key, self.path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all().await?;
        if entries.remove(key).is_some() {
            self.write_all(&entries).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("moyeo-storage-test-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[tokio::test]
    async fn test_values_survive_new_instance() {
        // テスト項目: 保存した値が別インスタンスからも読める（再起動後も残る）
        // given (前提条件):
        let path = temp_storage_path("local.json");
        let storage = JsonFileStorage::new(&path);
        storage
            .set("tombstones:ROOM1", "[42]".to_string())
            .await
            .unwrap();

        // when (操作):
        let reopened = JsonFileStorage::new(&path);
        let value = reopened.get("tombstones:ROOM1").await.unwrap();

        // then (期待する結果):
        assert_eq!(value.as_deref(), Some("[42]"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_empty() {
        // テスト項目: ファイルが存在しない場合は空のストレージとして扱われる
        // given (前提条件):
        let storage = JsonFileStorage::new(temp_storage_path("absent.json"));

        // when (操作):
        let value = storage.get("accessToken").await;

        // then (期待する結果):
        assert_eq!(value, Ok(None));
    }

    #[tokio::test]
    async fn test_corrupted_file_is_reported() {
        // テスト項目: 壊れたファイルは Corrupted エラーになる
        // given (前提条件):
        let path = temp_storage_path("broken.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        let storage = JsonFileStorage::new(&path);

        // when (操作):
        let result = storage.get("accessToken").await;

        // then (期待する結果):
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_remove_deletes_key() {
        // テスト項目: 削除したキーは読めなくなる
        // given (前提条件):
        let path = temp_storage_path("local.json");
        let storage = JsonFileStorage::new(&path);
        storage.set("userId", "7".to_string()).await.unwrap();
        storage.set("nickname", "guest".to_string()).await.unwrap();

        // when (操作):
        storage.remove("userId").await.unwrap();

        // then (期待する結果):
        assert_eq!(storage.get("userId").await, Ok(None));
        assert_eq!(
            storage.get("nickname").await,
            Ok(Some("guest".to_string()))
        );
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
