// SPDX-License-Identifier: MIT

//! Checkpoint lifecycle: create, verify, restore, retire
//!
//! Sequence numbers are monotonic per execution and enforced, so a
//! slow background write can never shadow a newer checkpoint. Restores
//! verify the payload checksum and fall back to the next-older valid
//! snapshot when integrity fails.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::CheckpointError;
use crate::state::ExecutionState;

use super::storage::CheckpointStorage;

/// Complete, self-contained snapshot of a suspended run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub execution_id: String,
    /// Node the run will execute next on resume
    pub next_node: String,
    /// Node ids visited so far
    pub path: Vec<String>,
    pub state: ExecutionState,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(next_node: impl Into<String>, path: Vec<String>, state: ExecutionState) -> Self {
        Self {
            execution_id: state.execution_id().to_string(),
            next_node: next_node.into(),
            path,
            state,
            created_at: Utc::now(),
        }
    }
}

/// On-storage wrapper: the serialized snapshot plus its integrity data
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    checkpoint_id: String,
    sequence: u64,
    checksum: u64,
    payload: String,
}

/// Index entry describing one stored checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    pub id: String,
    pub execution_id: String,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub size: usize,
    pub compressed: bool,
    pub checksum: u64,
}

/// Which checkpoints to keep per execution
#[derive(Debug, Clone, Default)]
pub struct RetentionPolicy {
    /// Keep at most this many checkpoints
    pub max_count: Option<usize>,
    /// Drop checkpoints older than this
    pub max_age: Option<Duration>,
}

impl RetentionPolicy {
    pub fn keep_last(count: usize) -> Self {
        Self {
            max_count: Some(count),
            max_age: None,
        }
    }
}

/// Creates, restores and retires checkpoints through a storage backend
pub struct CheckpointManager {
    storage: Arc<dyn CheckpointStorage>,
    retention: RetentionPolicy,
    index: RwLock<HashMap<String, Vec<CheckpointRecord>>>,
    sequences: Mutex<HashMap<String, u64>>,
}

impl CheckpointManager {
    pub fn new(storage: Arc<dyn CheckpointStorage>) -> Self {
        Self {
            storage,
            retention: RetentionPolicy::default(),
            index: RwLock::new(HashMap::new()),
            sequences: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    fn storage_key(execution_id: &str, sequence: u64) -> String {
        format!("{}/{:08}.ckpt", execution_id, sequence)
    }

    fn checksum(payload: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        payload.hash(&mut hasher);
        hasher.finish()
    }

    /// Persist a snapshot under a freshly reserved sequence number
    pub async fn create(&self, snapshot: &Snapshot) -> Result<CheckpointRecord, CheckpointError> {
        let sequence = self.reserve_sequence(&snapshot.execution_id).await;
        self.create_with_sequence(snapshot, sequence).await
    }

    /// Claim the next sequence number for an execution.
    ///
    /// Callers that persist asynchronously must reserve at the point the
    /// snapshot is taken, not at write time, so a delayed write keeps the
    /// ordering position of the state it captured.
    pub async fn reserve_sequence(&self, execution_id: &str) -> u64 {
        let mut sequences = self.sequences.lock().await;
        let next = sequences.entry(execution_id.to_string()).or_insert(0);
        *next += 1;
        *next
    }

    /// Persist a snapshot under an already reserved sequence number
    pub async fn create_with_sequence(
        &self,
        snapshot: &Snapshot,
        sequence: u64,
    ) -> Result<CheckpointRecord, CheckpointError> {
        // A sequence at or below one already in the index means writes
        // crossed; refuse rather than let an older snapshot shadow a newer one
        {
            let index = self.index.read().await;
            if let Some(last) = index
                .get(&snapshot.execution_id)
                .and_then(|records| records.last())
            {
                if sequence <= last.sequence {
                    return Err(CheckpointError::OutOfOrder {
                        execution_id: snapshot.execution_id.clone(),
                        got: sequence,
                        last: last.sequence,
                    });
                }
            }
        }

        let payload = serde_json::to_string(snapshot)?;
        let checksum = Self::checksum(&payload);
        let envelope = Envelope {
            checkpoint_id: Uuid::new_v4().to_string(),
            sequence,
            checksum,
            payload,
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let key = Self::storage_key(&snapshot.execution_id, sequence);
        self.storage.save(&key, bytes.clone()).await?;

        let record = CheckpointRecord {
            id: envelope.checkpoint_id,
            execution_id: snapshot.execution_id.clone(),
            sequence,
            created_at: snapshot.created_at,
            size: bytes.len(),
            compressed: false,
            checksum,
        };

        {
            let mut index = self.index.write().await;
            let records = index.entry(snapshot.execution_id.clone()).or_default();
            records.push(record.clone());
            records.sort_by_key(|r| r.sequence);
        }

        log::debug!(
            "checkpoint {} seq {} for execution {} ({} bytes)",
            record.id,
            sequence,
            snapshot.execution_id,
            record.size
        );

        self.apply_retention(&snapshot.execution_id).await;
        Ok(record)
    }

    /// Restore the newest valid checkpoint, falling back past corrupt ones
    pub async fn restore_latest(&self, execution_id: &str) -> Result<Snapshot, CheckpointError> {
        let mut keys = self.storage.list(&format!("{}/", execution_id)).await?;
        if keys.is_empty() {
            return Err(CheckpointError::NoCheckpoints(execution_id.to_string()));
        }
        // Zero-padded sequence keys sort chronologically
        keys.sort();

        for key in keys.iter().rev() {
            match self.load_verified(key).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => {
                    log::warn!("checkpoint {} unusable, trying older: {}", key, e);
                }
            }
        }

        Err(CheckpointError::Integrity {
            id: keys.last().cloned().unwrap_or_default(),
        })
    }

    /// Restore a specific checkpoint by id; no fallback
    pub async fn restore_by_id(&self, checkpoint_id: &str) -> Result<Snapshot, CheckpointError> {
        let record = {
            let index = self.index.read().await;
            index
                .values()
                .flatten()
                .find(|r| r.id == checkpoint_id)
                .cloned()
        }
        .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.to_string()))?;

        self.load_verified(&Self::storage_key(&record.execution_id, record.sequence))
            .await
    }

    async fn load_verified(&self, key: &str) -> Result<Snapshot, CheckpointError> {
        let bytes = self.storage.load(key).await?;
        let envelope: Envelope = serde_json::from_slice(&bytes)?;

        if Self::checksum(&envelope.payload) != envelope.checksum {
            return Err(CheckpointError::Integrity {
                id: envelope.checkpoint_id,
            });
        }

        Ok(serde_json::from_str(&envelope.payload)?)
    }

    /// Index records for one execution, oldest first
    pub async fn records(&self, execution_id: &str) -> Vec<CheckpointRecord> {
        self.index
            .read()
            .await
            .get(execution_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop checkpoints beyond the retention policy. The newest checkpoint
    /// of an execution is never deleted.
    async fn apply_retention(&self, execution_id: &str) {
        let expired: Vec<CheckpointRecord> = {
            let index = self.index.read().await;
            let Some(records) = index.get(execution_id) else {
                return;
            };
            if records.len() <= 1 {
                return;
            }

            let mut expired = Vec::new();
            let deletable = &records[..records.len() - 1];

            if let Some(max_count) = self.retention.max_count {
                let excess = records.len().saturating_sub(max_count);
                expired.extend(deletable.iter().take(excess).cloned());
            }
            if let Some(max_age) = self.retention.max_age {
                let cutoff = Utc::now() - max_age;
                for record in deletable {
                    if record.created_at < cutoff && !expired.iter().any(|r| r.id == record.id) {
                        expired.push(record.clone());
                    }
                }
            }
            expired
        };

        for record in expired {
            let key = Self::storage_key(&record.execution_id, record.sequence);
            if let Err(e) = self.storage.delete(&key).await {
                log::warn!("failed to retire checkpoint {}: {}", key, e);
                continue;
            }
            let mut index = self.index.write().await;
            if let Some(records) = index.get_mut(&record.execution_id) {
                records.retain(|r| r.id != record.id);
            }
        }
    }
}
