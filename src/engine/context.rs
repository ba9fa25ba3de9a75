// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::engine::dispatcher::EmbeddingDispatcher;
use crate::engine::fanout::{FanoutLedger, FanoutSummary, StorageCoordinator, WriteOutcome};
use crate::engine::run::{ItemFailure, RunId};
use crate::model::{EmbeddingRequest, EmbeddingResult, StorageWriteBatch};

/// Shared services handed to every task invocation of one run.
///
/// Cloning is cheap; clones share the same dispatcher, storage coordinator,
/// cancellation token and write ledger.
#[derive(Clone)]
pub struct RunContext {
    run_id: RunId,
    dispatcher: Arc<EmbeddingDispatcher>,
    storage: Arc<StorageCoordinator>,
    cancel: CancellationToken,
    ledger: Arc<Mutex<FanoutLedger>>,
    item_failures: Arc<Mutex<Vec<ItemFailure>>>,
}

impl RunContext {
    pub fn new(
        run_id: RunId,
        dispatcher: Arc<EmbeddingDispatcher>,
        storage: Arc<StorageCoordinator>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            dispatcher,
            storage,
            cancel,
            ledger: Arc::new(Mutex::new(FanoutLedger::new())),
            item_failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A context for one task invocation: shares everything with `self` except
    /// the item-failure buffer, so failures of an attempt that is later retried
    /// are dropped with it.
    pub(crate) fn for_invocation(&self) -> Self {
        Self {
            item_failures: Arc::new(Mutex::new(Vec::new())),
            ..self.clone()
        }
    }

    /// Records items this invocation gave up on without failing as a whole.
    pub fn record_item_failures(&self, failures: impl IntoIterator<Item = ItemFailure>) {
        self.item_failures.lock().extend(failures);
    }

    pub(crate) fn take_item_failures(&self) -> Vec<ItemFailure> {
        std::mem::take(&mut *self.item_failures.lock())
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Embeds through the shared dispatcher. Batches not yet started when the run
    /// is cancelled come back as cancelled failures.
    pub async fn embed(&self, requests: Vec<EmbeddingRequest>) -> Vec<EmbeddingResult> {
        self.dispatcher
            .submit_with_cancel(requests, &self.cancel)
            .await
    }

    /// Fans `batch` out to all backends and records the outcome against this run.
    pub async fn store(&self, mut batch: StorageWriteBatch) -> WriteOutcome {
        batch.run_id = Some(self.run_id);
        let outcome = self.storage.write(&batch).await;
        self.ledger.lock().record(&outcome);
        outcome
    }

    pub fn write_summary(&self) -> FanoutSummary {
        self.ledger.lock().summary()
    }

    pub(crate) fn ledger(&self) -> FanoutLedger {
        self.ledger.lock().clone()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("provider", &self.dispatcher.provider_name())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
