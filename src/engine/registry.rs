// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::engine::run::{PipelineRun, RunId, RunStatus, RunStatusReport, TaskExecutionRecord};
use crate::errors::PipelineError;

pub type SharedRun = Arc<RwLock<PipelineRun>>;

struct RunEntry {
    run: SharedRun,
    cancel: CancellationToken,
}

/// Every run known to an orchestrator, keyed by id.
///
/// Terminal runs are kept for the retention period so their status stays
/// queryable, then dropped by [`prune_expired`](Self::prune_expired).
pub struct RunRegistry {
    runs: DashMap<RunId, RunEntry>,
    retention: Duration,
}

impl RunRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            runs: DashMap::new(),
            retention,
        }
    }

    pub fn insert(&self, run: PipelineRun, cancel: CancellationToken) -> SharedRun {
        let id = run.id();
        let shared = Arc::new(RwLock::new(run));
        self.runs.insert(
            id,
            RunEntry {
                run: shared.clone(),
                cancel,
            },
        );
        shared
    }

    pub fn get(&self, run_id: RunId) -> Result<SharedRun, PipelineError> {
        self.runs
            .get(&run_id)
            .map(|entry| entry.run.clone())
            .ok_or(PipelineError::RunNotFound(run_id))
    }

    pub fn status(&self, run_id: RunId) -> Result<RunStatusReport, PipelineError> {
        Ok(self.get(run_id)?.read().status_report())
    }

    pub fn records(&self, run_id: RunId) -> Result<Vec<TaskExecutionRecord>, PipelineError> {
        Ok(self.get(run_id)?.read().records().to_vec())
    }

    /// Requests cancellation. Has no effect on a run that already reached a
    /// terminal state; returns the status at the time of the request.
    pub fn cancel(&self, run_id: RunId) -> Result<RunStatus, PipelineError> {
        let entry = self
            .runs
            .get(&run_id)
            .ok_or(PipelineError::RunNotFound(run_id))?;
        let status = entry.run.read().status();
        if !status.is_terminal() {
            entry.cancel.cancel();
        }
        Ok(status)
    }

    /// Drops terminal runs that ended longer ago than the retention period.
    pub fn prune_expired(&self) -> usize {
        let retention = match chrono::Duration::from_std(self.retention) {
            Ok(retention) => retention,
            Err(_) => return 0,
        };
        let now = Utc::now();
        let before = self.runs.len();
        self.runs.retain(|_, entry| {
            let run = entry.run.read();
            match run.ended_at() {
                Some(ended) if run.status().is_terminal() => now - ended <= retention,
                _ => true,
            }
        });
        let pruned = before.saturating_sub(self.runs.len());
        if pruned > 0 {
            tracing::debug!(pruned, "pruned expired pipeline runs");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
