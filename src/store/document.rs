//! Raw JSON document storage behind the [`StateStore`](super::StateStore).

#[cfg(test)]
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(test)]
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::DrillError;

/// Version stamped on a stored document, if any.
pub fn stored_version(document: &Value) -> Option<u64> {
    document.get("version").and_then(Value::as_u64)
}

/// Key/value store of JSON documents.
///
/// `compare_and_set` is the optimistic write used by atomic updates:
/// `expected` is the version read earlier, `None` meaning "absent".
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    async fn get(&self, doc_id: &str) -> Result<Option<Value>, DrillError>;

    async fn set(&self, doc_id: &str, document: Value) -> Result<(), DrillError>;

    async fn compare_and_set(
        &self,
        doc_id: &str,
        expected: Option<u64>,
        document: Value,
    ) -> Result<(), DrillError>;

    /// Writes several documents together, as close to atomically as the
    /// backend allows.
    async fn set_many(&self, documents: Vec<(String, Value)>) -> Result<(), DrillError>;

    async fn delete(&self, doc_id: &str) -> Result<(), DrillError>;
}

impl<T: DocumentStore> DocumentStore for Arc<T> {
    async fn get(&self, doc_id: &str) -> Result<Option<Value>, DrillError> {
        (**self).get(doc_id).await
    }

    async fn set(&self, doc_id: &str, document: Value) -> Result<(), DrillError> {
        (**self).set(doc_id, document).await
    }

    async fn compare_and_set(
        &self,
        doc_id: &str,
        expected: Option<u64>,
        document: Value,
    ) -> Result<(), DrillError> {
        (**self).compare_and_set(doc_id, expected, document).await
    }

    async fn set_many(&self, documents: Vec<(String, Value)>) -> Result<(), DrillError> {
        (**self).set_many(documents).await
    }

    async fn delete(&self, doc_id: &str) -> Result<(), DrillError> {
        (**self).delete(doc_id).await
    }
}

fn conflict(doc_id: &str, expected: Option<u64>, found: Option<u64>) -> DrillError {
    DrillError::VersionConflict {
        document: doc_id.to_string(),
        expected,
        found,
    }
}

/// In-process store; every operation, `set_many` included, is atomic.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<String, Value>>,
}

#[cfg(test)]
impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, doc_id: &str) -> Result<Option<Value>, DrillError> {
        Ok(self.documents.lock().get(doc_id).cloned())
    }

    async fn set(&self, doc_id: &str, document: Value) -> Result<(), DrillError> {
        self.documents.lock().insert(doc_id.to_string(), document);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        doc_id: &str,
        expected: Option<u64>,
        document: Value,
    ) -> Result<(), DrillError> {
        let mut documents = self.documents.lock();
        let found = documents.get(doc_id).map(|d| stored_version(d).unwrap_or(0));
        if found != expected {
            return Err(conflict(doc_id, expected, found));
        }
        documents.insert(doc_id.to_string(), document);
        Ok(())
    }

    async fn set_many(&self, documents: Vec<(String, Value)>) -> Result<(), DrillError> {
        let mut stored = self.documents.lock();
        for (doc_id, document) in documents {
            stored.insert(doc_id, document);
        }
        Ok(())
    }

    async fn delete(&self, doc_id: &str) -> Result<(), DrillError> {
        self.documents.lock().remove(doc_id);
        Ok(())
    }
}

/// One pretty-printed JSON file per document inside a directory.
///
/// Writes go to a temporary file that is renamed over the target. The
/// compare-and-set guard is in-process only; a single writer per
/// directory is assumed.
#[derive(Debug)]
pub struct FileDocumentStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileDocumentStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, DrillError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, doc_id: &str) -> PathBuf {
        self.dir.join(format!("{doc_id}.json"))
    }

    fn staging_path_for(&self, doc_id: &str) -> PathBuf {
        self.dir.join(format!("{doc_id}.json.tmp"))
    }

    async fn read(&self, doc_id: &str) -> Result<Option<Value>, DrillError> {
        match tokio::fs::read_to_string(self.path_for(doc_id)).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn stage(&self, doc_id: &str, document: &Value) -> Result<PathBuf, DrillError> {
        let staging = self.staging_path_for(doc_id);
        let body = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&staging, body).await?;
        Ok(staging)
    }

    async fn write(&self, doc_id: &str, document: &Value) -> Result<(), DrillError> {
        let staging = self.stage(doc_id, document).await?;
        tokio::fs::rename(staging, self.path_for(doc_id)).await?;
        Ok(())
    }
}

impl DocumentStore for FileDocumentStore {
    async fn get(&self, doc_id: &str) -> Result<Option<Value>, DrillError> {
        self.read(doc_id).await
    }

    async fn set(&self, doc_id: &str, document: Value) -> Result<(), DrillError> {
        let _guard = self.write_lock.lock().await;
        self.write(doc_id, &document).await
    }

    async fn compare_and_set(
        &self,
        doc_id: &str,
        expected: Option<u64>,
        document: Value,
    ) -> Result<(), DrillError> {
        let _guard = self.write_lock.lock().await;
        let found = self
            .read(doc_id)
            .await?
            .map(|d| stored_version(&d).unwrap_or(0));
        if found != expected {
            return Err(conflict(doc_id, expected, found));
        }
        self.write(doc_id, &document).await
    }

    async fn set_many(&self, documents: Vec<(String, Value)>) -> Result<(), DrillError> {
        let _guard = self.write_lock.lock().await;
        // Stage everything first so a serialization or disk-full failure
        // leaves every target untouched.
        let mut staged = Vec::with_capacity(documents.len());
        for (doc_id, document) in &documents {
            staged.push((self.stage(doc_id, document).await?, self.path_for(doc_id)));
        }
        for (staging, target) in staged {
            tokio::fs::rename(staging, target).await?;
        }
        Ok(())
    }

    async fn delete(&self, doc_id: &str) -> Result<(), DrillError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(doc_id)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_compare_and_set() {
        let store = MemoryDocumentStore::new();
        store.compare_and_set("p", None, json!({"version": 1})).await.unwrap();

        let err = store
            .compare_and_set("p", None, json!({"version": 1}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DrillError::VersionConflict {
                expected: None,
                found: Some(1),
                ..
            }
        ));

        store.compare_and_set("p", Some(1), json!({"version": 2})).await.unwrap();
        assert_eq!(store.get("p").await.unwrap(), Some(json!({"version": 2})));
    }

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::open(dir.path().join("state")).unwrap();

        assert_eq!(store.get("settings").await.unwrap(), None);
        store.set("settings", json!({"dailyQuota": 3})).await.unwrap();
        assert_eq!(
            store.get("settings").await.unwrap(),
            Some(json!({"dailyQuota": 3}))
        );
        assert!(store.dir().join("settings.json").exists());
        assert!(!store.dir().join("settings.json.tmp").exists());

        store.delete("settings").await.unwrap();
        store.delete("settings").await.unwrap();
        assert_eq!(store.get("settings").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_detects_stale_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::open(dir.path()).unwrap();
        store.compare_and_set("progress", None, json!({"version": 1})).await.unwrap();

        let err = store
            .compare_and_set("progress", Some(0), json!({"version": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, DrillError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn file_store_writes_many() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::open(dir.path()).unwrap();
        store
            .set_many(vec![
                ("progress".to_string(), json!({"version": 4})),
                ("settings".to_string(), json!({"version": 2})),
            ])
            .await
            .unwrap();
        assert_eq!(stored_version(&store.get("progress").await.unwrap().unwrap()), Some(4));
        assert_eq!(stored_version(&store.get("settings").await.unwrap().unwrap()), Some(2));
    }

    #[tokio::test]
    async fn corrupt_file_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("progress.json"), "{not json").unwrap();
        let store = FileDocumentStore::open(dir.path()).unwrap();
        assert!(matches!(store.get("progress").await, Err(DrillError::Json(_))));
    }
}
