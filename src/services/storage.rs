use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Flat-file JSON store: one pretty-printed document per key.
///
/// Keys are relative paths under the data root, mirroring the on-disk group
/// tree (`<groupId>/metadata/<itemId>.json`, ...). Writes are last-writer-wins
/// with no locking; concurrent read-modify-write cycles on the same key can
/// lose an update. Callers that care are documented at their call sites.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a storage key.
    pub fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Read a document. Missing file yields `None`; corrupt or mismatched
    /// JSON is logged and yields `None` rather than failing the caller.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.resolve(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }

        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                error!("Corrupt JSON at {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Read a list document, treating missing/empty/corrupt files as empty.
    pub async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        Ok(self.read(key).await?.unwrap_or_default())
    }

    /// Write a document, creating parent directories as needed.
    pub async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&path, json).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> bool {
        tokio::fs::try_exists(self.resolve(key)).await.unwrap_or(false)
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.resolve(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let value: Option<serde_json::Value> = store.read("g1/metadata/nope.json").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let path = dir.path().join("g1/comments/item.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{not json").unwrap();

        let list: Vec<serde_json::Value> = store.read_list("g1/comments/item.json").await.unwrap();
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        let doc = json!({"a": 1, "b": ["x", "y"]});
        store.write("g1/users/identities.json", &doc).await.unwrap();

        let back: Option<serde_json::Value> = store.read("g1/users/identities.json").await.unwrap();
        assert_eq!(back, Some(doc));
    }
}
