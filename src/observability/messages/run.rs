// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the pipeline run lifecycle.
//!
//! This module contains message types for logging events related to:
//! * Run submission and state transitions
//! * Task invocation, retry and completion
//! * Cooperative cancellation

use crate::engine::run::{RunId, RunStatus, TaskOutcome};
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A pipeline was submitted and a run created.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use mnemo_pipeline::engine::run::RunId;
/// use mnemo_pipeline::observability::messages::run::RunSubmitted;
///
/// let run_id = RunId::new();
/// let msg = RunSubmitted {
///     run_id,
///     pipeline: "cognify",
///     task_count: 4,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct RunSubmitted<'a> {
    pub run_id: RunId,
    pub pipeline: &'a str,
    pub task_count: usize,
}

impl Display for RunSubmitted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Run {} submitted for pipeline '{}' with {} task(s)",
            self.run_id, self.pipeline, self.task_count
        )
    }
}

impl StructuredLog for RunSubmitted<'_> {
    fn log(&self) {
        tracing::info!(
            run_id = %self.run_id,
            pipeline = self.pipeline,
            task_count = self.task_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "pipeline_run",
            span_name = name,
            run_id = %self.run_id,
            pipeline = self.pipeline,
            task_count = self.task_count,
        )
    }
}

/// A run moved to a new state.
///
/// # Log Level
/// `debug!` for non-terminal states, `info!` for terminal ones
pub struct RunTransitioned {
    pub run_id: RunId,
    pub from: RunStatus,
    pub to: RunStatus,
}

impl Display for RunTransitioned {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Run {} transitioned {} -> {}", self.run_id, self.from, self.to)
    }
}

impl StructuredLog for RunTransitioned {
    fn log(&self) {
        if self.to.is_terminal() {
            tracing::info!(
                run_id = %self.run_id,
                from = %self.from,
                to = %self.to,
                "{}", self
            );
        } else {
            tracing::debug!(
                run_id = %self.run_id,
                from = %self.from,
                to = %self.to,
                "{}", self
            );
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "run_transition",
            span_name = name,
            run_id = %self.run_id,
            from = %self.from,
            to = %self.to,
        )
    }
}

/// A task invocation failed and will be re-invoked from its checkpoint.
///
/// # Log Level
/// `warn!` - Recoverable problem
pub struct TaskRetrying<'a> {
    pub run_id: RunId,
    pub task: &'a str,
    pub attempt: u32,
    pub error: &'a dyn std::error::Error,
}

impl Display for TaskRetrying<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task '{}' of run {} failed on attempt {}, retrying: {}",
            self.task, self.run_id, self.attempt, self.error
        )
    }
}

impl StructuredLog for TaskRetrying<'_> {
    fn log(&self) {
        tracing::warn!(
            run_id = %self.run_id,
            task = self.task,
            attempt = self.attempt,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "task_retry",
            span_name = name,
            run_id = %self.run_id,
            task = self.task,
            attempt = self.attempt,
        )
    }
}

/// A task reached its terminal outcome for this run.
///
/// # Log Level
/// `info!` on success, `error!` on failure
pub struct TaskFinished<'a> {
    pub run_id: RunId,
    pub task: &'a str,
    pub outcome: TaskOutcome,
    pub attempts: u32,
    pub duration: Duration,
}

impl Display for TaskFinished<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Task '{}' of run {} finished {} after {} attempt(s) in {:?}",
            self.task, self.run_id, self.outcome, self.attempts, self.duration
        )
    }
}

impl StructuredLog for TaskFinished<'_> {
    fn log(&self) {
        if self.outcome == TaskOutcome::Failed {
            tracing::error!(
                run_id = %self.run_id,
                task = self.task,
                outcome = %self.outcome,
                attempts = self.attempts,
                duration_ms = self.duration.as_millis() as u64,
                "{}", self
            );
        } else {
            tracing::info!(
                run_id = %self.run_id,
                task = self.task,
                outcome = %self.outcome,
                attempts = self.attempts,
                duration_ms = self.duration.as_millis() as u64,
                "{}", self
            );
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "task",
            span_name = name,
            run_id = %self.run_id,
            task = self.task,
            outcome = %self.outcome,
            attempts = self.attempts,
        )
    }
}

/// Cancellation was observed at a task boundary.
///
/// # Log Level
/// `info!` - Important operational event
pub struct CancellationObserved<'a> {
    pub run_id: RunId,
    /// The task that would have run next, if any.
    pub next_task: Option<&'a str>,
}

impl Display for CancellationObserved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.next_task {
            Some(task) => write!(
                f,
                "Run {} cancelled before task '{}'",
                self.run_id, task
            ),
            None => write!(f, "Run {} cancelled after its last task", self.run_id),
        }
    }
}

impl StructuredLog for CancellationObserved<'_> {
    fn log(&self) {
        tracing::info!(
            run_id = %self.run_id,
            next_task = self.next_task,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "run_cancelled",
            span_name = name,
            run_id = %self.run_id,
        )
    }
}
