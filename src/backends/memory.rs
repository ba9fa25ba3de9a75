// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-memory storage backend usable for any of the three backend kinds.
//!
//! Records are kept in an insertion-ordered map keyed by record id, so rewriting
//! a record replaces it. A [`FailureMode`] can be set at any time to make the
//! store misbehave, which is how the fan-out and orchestrator tests exercise
//! partial failures.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::fanout::StorageBackends;
use crate::errors::StorageError;
use crate::model::{BackendKind, ItemWriteResult, StorageRecord};
use crate::traits::{BackendHealth, StorageBackend};

/// Process-wide write sequence, used to observe write ordering across stores.
static WRITE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, PartialEq)]
pub enum FailureMode {
    #[default]
    None,
    /// Every write call fails with a transient error.
    Unavailable,
    /// The next `n` write calls fail with a transient error.
    UnavailableFor(u32),
    /// Health checks fail and writes fail fatally.
    Unreachable,
    /// Records with these ids are rejected; the rest are written.
    RejectIds(Vec<String>),
    /// Every write call takes this long before it is processed.
    Slow(Duration),
}

pub struct MemoryStore {
    kind: BackendKind,
    name: String,
    records: Mutex<Vec<StorageRecord>>,
    failure: Mutex<FailureMode>,
    write_calls: AtomicUsize,
    last_write_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            name: format!("memory-{}", kind),
            records: Mutex::new(Vec::new()),
            failure: Mutex::new(FailureMode::None),
            write_calls: AtomicUsize::new(0),
            last_write_seq: AtomicU64::new(0),
        }
    }

    pub fn set_failure(&self, mode: FailureMode) {
        *self.failure.lock() = mode;
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn records(&self) -> Vec<StorageRecord> {
        self.records.lock().clone()
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.records.lock().iter().any(|r| r.id() == record_id)
    }

    /// Number of write calls received, successful or not.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Sequence number of this store's most recent successful write, 0 if none.
    pub fn last_write_seq(&self) -> u64 {
        self.last_write_seq.load(Ordering::SeqCst)
    }

    /// Applies the current failure mode to one call. Returns the ids to reject.
    fn check_call(&self) -> Result<HashSet<String>, StorageError> {
        let mut failure = self.failure.lock();
        match &mut *failure {
            FailureMode::None | FailureMode::Slow(_) => Ok(HashSet::new()),
            FailureMode::Unavailable => Err(self.unavailable()),
            FailureMode::UnavailableFor(remaining) => {
                if *remaining == 0 {
                    *failure = FailureMode::None;
                    return Ok(HashSet::new());
                }
                *remaining -= 1;
                Err(self.unavailable())
            }
            FailureMode::Unreachable => Err(StorageError::Unreachable { backend: self.kind }),
            FailureMode::RejectIds(ids) => Ok(ids.iter().cloned().collect()),
        }
    }

    fn unavailable(&self) -> StorageError {
        StorageError::Unavailable {
            backend: self.kind,
            reason: "injected failure".into(),
        }
    }
}

/// One in-memory store per backend kind.
#[derive(Clone)]
pub struct MemoryStores {
    pub graph: Arc<MemoryStore>,
    pub vector: Arc<MemoryStore>,
    pub relational: Arc<MemoryStore>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self {
            graph: Arc::new(MemoryStore::new(BackendKind::Graph)),
            vector: Arc::new(MemoryStore::new(BackendKind::Vector)),
            relational: Arc::new(MemoryStore::new(BackendKind::Relational)),
        }
    }

    pub fn get(&self, kind: BackendKind) -> &Arc<MemoryStore> {
        match kind {
            BackendKind::Graph => &self.graph,
            BackendKind::Vector => &self.vector,
            BackendKind::Relational => &self.relational,
        }
    }

    pub fn backends(&self) -> StorageBackends {
        StorageBackends::new(
            self.graph.clone(),
            self.vector.clone(),
            self.relational.clone(),
        )
    }
}

impl Default for MemoryStores {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, records: &[StorageRecord]) -> Result<Vec<ItemWriteResult>, StorageError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let delay = match &*self.failure.lock() {
            FailureMode::Slow(delay) => Some(*delay),
            _ => None,
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let rejected = self.check_call()?;

        let mut stored = self.records.lock();
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id();
            if rejected.contains(&id) {
                results.push(ItemWriteResult::failed(
                    id.clone(),
                    StorageError::RejectedRecord {
                        backend: self.kind,
                        record_id: id,
                        reason: "rejected by injected failure".into(),
                    },
                ));
                continue;
            }
            match stored.iter_mut().find(|r| r.id() == id) {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
            results.push(ItemWriteResult::ok(id));
        }
        let seq = WRITE_SEQUENCE.fetch_add(1, Ordering::SeqCst) + 1;
        self.last_write_seq.store(seq, Ordering::SeqCst);
        Ok(results)
    }

    async fn health_check(&self) -> BackendHealth {
        match &*self.failure.lock() {
            FailureMode::Unreachable => BackendHealth::Unreachable {
                reason: format!("{} is not accepting connections", self.name),
            },
            _ => BackendHealth::Reachable,
        }
    }
}
