// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Storage fan-out: one write batch, three independent backends, no shared transaction.
//!
//! Backends are written in a fixed order, graph then vector then relational.
//! A relational metadata row without its graph/vector counterpart is a harmless
//! orphan; graph or vector entries without metadata cannot be traced back, so
//! metadata always goes last.
//!
//! Each backend write is retried on its own. A whole-call failure retries the
//! call; per-record failures retry only the failed records. A backend that still
//! fails is recorded in the [`WriteOutcome`] and the coordinator moves on to the
//! next backend. Whether accumulated failures sink the run is decided by the
//! orchestrator through a [`FanoutLedger`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::consts::DEFAULT_STORAGE_WRITE_TIMEOUT_MS;
use crate::engine::run::RunId;
use crate::errors::{PipelineError, StorageError};
use crate::model::{BackendKind, StorageRecord, StorageWriteBatch};
use crate::observability::messages::storage::{
    BackendUnreachable, BackendWriteFailed, FanoutCompleted,
};
use crate::observability::messages::StructuredLog;
use crate::resilience::{RetryDecision, RetryPolicy};
use crate::traits::{BackendHealth, StorageBackend};

#[derive(Debug, Clone, PartialEq)]
pub struct FanoutSettings {
    /// Timeout of a single backend write call.
    pub write_timeout: Duration,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_millis(DEFAULT_STORAGE_WRITE_TIMEOUT_MS),
        }
    }
}

/// The graph, vector and relational backends, one implementation each.
#[derive(Clone)]
pub struct StorageBackends {
    graph: Arc<dyn StorageBackend>,
    vector: Arc<dyn StorageBackend>,
    relational: Arc<dyn StorageBackend>,
}

impl StorageBackends {
    pub fn new(
        graph: Arc<dyn StorageBackend>,
        vector: Arc<dyn StorageBackend>,
        relational: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            graph,
            vector,
            relational,
        }
    }

    pub fn get(&self, kind: BackendKind) -> &Arc<dyn StorageBackend> {
        match kind {
            BackendKind::Graph => &self.graph,
            BackendKind::Vector => &self.vector,
            BackendKind::Relational => &self.relational,
        }
    }
}

impl std::fmt::Debug for StorageBackends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageBackends")
            .field("graph", &self.graph.name())
            .field("vector", &self.vector.name())
            .field("relational", &self.relational.name())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendWriteStatus {
    /// Every record was written.
    Written,
    /// Some records were written, some failed.
    Partial,
    /// Nothing was written.
    Failed,
    /// The batch had no records for this backend.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub record_id: String,
    pub error: StorageError,
}

/// What happened to one backend's share of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendWriteOutcome {
    pub backend: BackendKind,
    pub status: BackendWriteStatus,
    pub attempts: u32,
    pub written: usize,
    pub failures: Vec<RecordFailure>,
}

impl BackendWriteOutcome {
    fn skipped(backend: BackendKind) -> Self {
        Self {
            backend,
            status: BackendWriteStatus::Skipped,
            attempts: 0,
            written: 0,
            failures: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        matches!(
            self.status,
            BackendWriteStatus::Partial | BackendWriteStatus::Failed
        )
    }
}

/// Per-backend report for one batch. Never collapsed into a single boolean.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub batch_id: String,
    pub run_id: Option<RunId>,
    /// In write order.
    pub backends: Vec<BackendWriteOutcome>,
}

impl WriteOutcome {
    pub fn backend(&self, kind: BackendKind) -> Option<&BackendWriteOutcome> {
        self.backends.iter().find(|b| b.backend == kind)
    }

    pub fn has_failures(&self) -> bool {
        self.backends.iter().any(BackendWriteOutcome::has_failures)
    }

    pub fn failed_backends(&self) -> Vec<BackendKind> {
        self.backends
            .iter()
            .filter(|b| b.has_failures())
            .map(|b| b.backend)
            .collect()
    }

    pub fn written(&self) -> usize {
        self.backends.iter().map(|b| b.written).sum()
    }

    pub fn failed(&self) -> usize {
        self.backends.iter().map(|b| b.failures.len()).sum()
    }
}

/// Reachability of every backend.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub backends: Vec<(BackendKind, BackendHealth)>,
}

impl HealthReport {
    pub fn unreachable(&self) -> Vec<BackendKind> {
        self.backends
            .iter()
            .filter(|(_, health)| !health.is_reachable())
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn all_reachable(&self) -> bool {
        self.unreachable().is_empty()
    }
}

/// Writes batches to the three backends in order and reports per-backend outcomes.
pub struct StorageCoordinator {
    backends: StorageBackends,
    retry: RetryPolicy,
    settings: FanoutSettings,
}

impl StorageCoordinator {
    pub fn new(backends: StorageBackends, retry: RetryPolicy, settings: FanoutSettings) -> Self {
        Self {
            backends,
            retry,
            settings,
        }
    }

    pub async fn health_check(&self) -> HealthReport {
        let mut backends = Vec::with_capacity(BackendKind::WRITE_ORDER.len());
        for kind in BackendKind::WRITE_ORDER {
            let health = self.backends.get(kind).health_check().await;
            if let BackendHealth::Unreachable { reason } = &health {
                BackendUnreachable {
                    backend: kind,
                    reason,
                }
                .log();
            }
            backends.push((kind, health));
        }
        HealthReport { backends }
    }

    /// Writes `batch` to graph, vector and relational backends, in that order.
    pub async fn write(&self, batch: &StorageWriteBatch) -> WriteOutcome {
        let mut backends = Vec::with_capacity(BackendKind::WRITE_ORDER.len());
        for kind in BackendKind::WRITE_ORDER {
            let records = batch.records_for(kind);
            let outcome = self.write_backend(&batch.batch_id, kind, records).await;
            backends.push(outcome);
        }

        let outcome = WriteOutcome {
            batch_id: batch.batch_id.clone(),
            run_id: batch.run_id,
            backends,
        };
        FanoutCompleted {
            batch_id: &outcome.batch_id,
            written: outcome.written(),
            failed: outcome.failed(),
        }
        .log();
        outcome
    }

    async fn write_backend(
        &self,
        batch_id: &str,
        kind: BackendKind,
        records: Vec<StorageRecord>,
    ) -> BackendWriteOutcome {
        if records.is_empty() {
            return BackendWriteOutcome::skipped(kind);
        }
        let backend = self.backends.get(kind);
        let mut pending = records;
        let mut written = 0;
        let mut failures = Vec::new();
        let mut attempt = 0;
        let mut first_error: Option<StorageError> = None;

        while !pending.is_empty() {
            attempt += 1;
            let call = tokio::time::timeout(self.settings.write_timeout, backend.write(&pending))
                .await
                .unwrap_or(Err(StorageError::Timeout {
                    backend: kind,
                    timeout: self.settings.write_timeout,
                }));

            match call {
                Ok(results) => {
                    let mut retry_next = Vec::new();
                    let mut results = results.into_iter();
                    for record in pending.drain(..) {
                        let result = match results.next() {
                            Some(item) => item.result,
                            None => Err(StorageError::RejectedRecord {
                                backend: kind,
                                record_id: record.id(),
                                reason: "backend returned no result for record".into(),
                            }),
                        };
                        match result {
                            Ok(()) => written += 1,
                            Err(err) => {
                                first_error.get_or_insert_with(|| err.clone());
                                match self.retry.decide(&err, attempt) {
                                    RetryDecision::Retry { .. } => retry_next.push(record),
                                    RetryDecision::GiveUp(_) => failures.push(RecordFailure {
                                        record_id: record.id(),
                                        error: err,
                                    }),
                                }
                            }
                        }
                    }
                    if !retry_next.is_empty() {
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    }
                    pending = retry_next;
                }
                Err(err) => {
                    first_error.get_or_insert_with(|| err.clone());
                    match self.retry.decide(&err, attempt) {
                        RetryDecision::Retry { delay } => {
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::GiveUp(_) => {
                            failures.extend(pending.drain(..).map(|record| RecordFailure {
                                record_id: record.id(),
                                error: err.clone(),
                            }));
                        }
                    }
                }
            }
        }

        let status = match (written, failures.is_empty()) {
            (_, true) => BackendWriteStatus::Written,
            (0, false) => BackendWriteStatus::Failed,
            (_, false) => BackendWriteStatus::Partial,
        };

        if let Some(err) = first_error.as_ref().filter(|_| !failures.is_empty()) {
            BackendWriteFailed {
                batch_id,
                backend: kind,
                attempts: attempt,
                failed_records: failures.len(),
                error: err,
            }
            .log();
        }

        BackendWriteOutcome {
            backend: kind,
            status,
            attempts: attempt,
            written,
            failures,
        }
    }
}

/// Aggregated write results of one run, as shown in status reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FanoutSummary {
    pub batches: usize,
    pub failed_batches: usize,
    pub records_written: usize,
    pub records_failed: usize,
    pub backend_failures: BTreeMap<BackendKind, usize>,
}

/// Latest known outcome of one batch.
#[derive(Debug, Clone, PartialEq)]
struct BatchTally {
    written: usize,
    failed: usize,
    failed_backends: Vec<BackendKind>,
}

/// Running account of a run's write outcomes, checked against the
/// partial-failure threshold after every task.
///
/// Outcomes are keyed by batch id. A batch stored again, as happens when a task
/// invocation is retried, replaces its earlier outcome instead of counting twice.
#[derive(Debug, Clone, Default)]
pub struct FanoutLedger {
    batches: BTreeMap<String, BatchTally>,
}

impl FanoutLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &WriteOutcome) {
        self.batches.insert(
            outcome.batch_id.clone(),
            BatchTally {
                written: outcome.written(),
                failed: outcome.failed(),
                failed_backends: outcome.failed_backends(),
            },
        );
    }

    pub fn summary(&self) -> FanoutSummary {
        let mut summary = FanoutSummary {
            batches: self.batches.len(),
            ..FanoutSummary::default()
        };
        for tally in self.batches.values() {
            summary.records_written += tally.written;
            summary.records_failed += tally.failed;
            if !tally.failed_backends.is_empty() {
                summary.failed_batches += 1;
            }
            for kind in &tally.failed_backends {
                *summary.backend_failures.entry(*kind).or_insert(0) += 1;
            }
        }
        summary
    }

    /// Fails when any single backend, or the batches overall, fail in a fraction
    /// strictly greater than `threshold`.
    pub fn check_threshold(&self, threshold: f64) -> Result<(), PipelineError> {
        let summary = self.summary();
        if summary.batches == 0 {
            return Ok(());
        }
        let total = summary.batches as f64;
        let exceeded = |failed: usize| failed as f64 / total > threshold;

        let pervasive_backend = summary
            .backend_failures
            .iter()
            .find(|(_, failed)| exceeded(**failed))
            .map(|(kind, _)| *kind);

        if pervasive_backend.is_some() || exceeded(summary.failed_batches) {
            return Err(PipelineError::PartialFailureThresholdExceeded {
                failed_batches: summary.failed_batches,
                total_batches: summary.batches,
                threshold,
                pervasive_backend,
            });
        }
        Ok(())
    }
}
