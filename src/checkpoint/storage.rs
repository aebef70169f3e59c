// SPDX-License-Identifier: MIT

//! Pluggable checkpoint storage backends
//!
//! The engine only requires this narrow byte-oriented contract; anything
//! from a local directory to an object store can sit behind it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::CheckpointError;

/// Narrow save/load contract all checkpoint backends implement
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<(), CheckpointError>;

    async fn load(&self, key: &str) -> Result<Vec<u8>, CheckpointError>;

    async fn delete(&self, key: &str) -> Result<(), CheckpointError>;

    /// Keys starting with `prefix`, in no particular order
    async fn list(&self, prefix: &str) -> Result<Vec<String>, CheckpointError>;
}

/// In-memory backend, the default for tests and single-process runs
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStorage for MemoryStorage {
    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<(), CheckpointError> {
        self.entries.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>, CheckpointError> {
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), CheckpointError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, CheckpointError> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Filesystem backend storing each checkpoint as a file under a root
/// directory; the key's `/` separators become subdirectories
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl CheckpointStorage for FileStorage {
    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<(), CheckpointError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>, CheckpointError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CheckpointError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CheckpointError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, CheckpointError> {
        // Keys are "<execution_id>/<file>", so a prefix names a directory
        let dir = self.root.join(prefix.trim_end_matches('/'));
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let base = prefix.trim_end_matches('/');
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                keys.push(format!("{}/{}", base, entry.file_name().to_string_lossy()));
            }
        }
        Ok(keys)
    }
}

/// Backend fanning every write out to N replicas.
///
/// A save acknowledges only when all replicas took it; anything less is
/// surfaced as an explicit partial-write degradation. Reads fall through
/// replicas in order.
pub struct ReplicatedStorage {
    replicas: Vec<Arc<dyn CheckpointStorage>>,
}

impl ReplicatedStorage {
    pub fn new(replicas: Vec<Arc<dyn CheckpointStorage>>) -> Self {
        Self { replicas }
    }

    pub fn replication_factor(&self) -> usize {
        self.replicas.len()
    }
}

#[async_trait]
impl CheckpointStorage for ReplicatedStorage {
    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<(), CheckpointError> {
        let writes = self
            .replicas
            .iter()
            .map(|r| r.save(key, bytes.clone()));
        let results = futures::future::join_all(writes).await;

        let written = results.iter().filter(|r| r.is_ok()).count();
        if written < self.replicas.len() {
            return Err(CheckpointError::PartialWrite {
                written,
                total: self.replicas.len(),
            });
        }
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>, CheckpointError> {
        let mut last_err = CheckpointError::NotFound(key.to_string());
        for replica in &self.replicas {
            match replica.load(key).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    async fn delete(&self, key: &str) -> Result<(), CheckpointError> {
        for replica in &self.replicas {
            replica.delete(key).await?;
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, CheckpointError> {
        let mut last_err = None;
        for replica in &self.replicas {
            match replica.list(prefix).await {
                Ok(keys) => return Ok(keys),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| CheckpointError::Storage("no replicas".to_string())))
    }
}
