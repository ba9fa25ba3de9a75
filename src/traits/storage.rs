use async_trait::async_trait;

use crate::errors::StorageError;
use crate::model::{BackendKind, ItemWriteResult, StorageRecord};

/// Reachability reported by a backend health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendHealth {
    Reachable,
    Unreachable { reason: String },
}

impl BackendHealth {
    pub fn is_reachable(&self) -> bool {
        matches!(self, BackendHealth::Reachable)
    }
}

/// One of the three storage systems a write batch fans out to.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn name(&self) -> &str;

    /// Writes `records`, returning one result per record in input order.
    ///
    /// `Err` means the call as a whole failed and nothing is known to be written.
    async fn write(&self, records: &[StorageRecord]) -> Result<Vec<ItemWriteResult>, StorageError>;

    async fn health_check(&self) -> BackendHealth;
}
