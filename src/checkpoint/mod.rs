// SPDX-License-Identifier: MIT

//! Checkpointing: snapshot, persist, restore, resume
//!
//! A checkpoint is a complete, self-contained snapshot of everything a run
//! needs to resume: the state, the node about to execute, and the path so
//! far. Storage is pluggable behind a narrow save/load contract.

mod manager;
mod storage;

pub use manager::{CheckpointManager, CheckpointRecord, RetentionPolicy, Snapshot};
pub use storage::{CheckpointStorage, FileStorage, MemoryStorage, ReplicatedStorage};
