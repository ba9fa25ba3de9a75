// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pipeline run state: identity, lifecycle, per-task execution records and progress.
//!
//! A [`PipelineRun`] is owned by the orchestrator and only changes through
//! [`PipelineRun::transition`] and the record/progress helpers below. The
//! lifecycle is a one-way state machine:
//!
//! ```text
//! PENDING ──▶ PROCESSING ──▶ COMPLETED
//!    │            ├────────▶ FAILED
//!    │            └────────▶ CANCELLED
//!    ├──────────────────────▶ FAILED     (health check short-circuit)
//!    └──────────────────────▶ CANCELLED  (cancelled before first dispatch)
//! ```
//!
//! Terminal states are never left, and no state is ever revisited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::engine::fanout::FanoutSummary;
use crate::errors::{Classify, ErrorClass, PipelineError};

/// Opaque identifier of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Position in the lifecycle; every legal transition strictly increases it.
    pub fn rank(self) -> u8 {
        match self {
            RunStatus::Pending => 0,
            RunStatus::Processing => 1,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled => 2,
        }
    }

    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match (self, next) {
            (RunStatus::Pending, RunStatus::Processing)
            | (RunStatus::Pending, RunStatus::Failed)
            | (RunStatus::Pending, RunStatus::Cancelled) => true,
            (RunStatus::Processing, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Processing => "PROCESSING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "CANCELLED",
        };
        f.write_str(label)
    }
}

/// Terminal outcome of one task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskOutcome {
    /// Succeeded on the first attempt.
    Success,
    /// Succeeded after at least one retry.
    Retried,
    Failed,
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskOutcome::Success => "SUCCESS",
            TaskOutcome::Retried => "RETRIED",
            TaskOutcome::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Per-run, per-task execution record. Appended once the task reaches a terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecutionRecord {
    pub task: String,
    pub index: usize,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: TaskOutcome,
    /// Error of every failed attempt, oldest first.
    pub errors: Vec<String>,
    /// Items the task gave up on while the invocation as a whole succeeded.
    #[serde(default)]
    pub item_failures: Vec<ItemFailure>,
}

/// A single work item a task could not process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub item_id: String,
    pub class: ErrorClass,
    pub reason: String,
}

impl ItemFailure {
    pub fn new<E: Classify + fmt::Display>(item_id: impl Into<String>, error: &E) -> Self {
        Self {
            item_id: item_id.into(),
            class: error.class(),
            reason: error.to_string(),
        }
    }
}

/// Most specific error known for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub class: ErrorClass,
    pub task: Option<String>,
    pub message: String,
}

impl From<&PipelineError> for RunError {
    fn from(error: &PipelineError) -> Self {
        let task = match error {
            PipelineError::TaskFailed { task, .. } => Some(task.clone()),
            _ => None,
        };
        Self {
            class: error.class(),
            task,
            message: error.to_string(),
        }
    }
}

/// Snapshot returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatusReport {
    pub run_id: RunId,
    pub pipeline: String,
    pub status: RunStatus,
    pub progress: f64,
    pub current_task: Option<String>,
    pub error: Option<RunError>,
    /// Item-level failures absorbed by tasks that still succeeded.
    pub items_failed: usize,
    pub write_summary: Option<FanoutSummary>,
    /// Every status the run has held, in order.
    pub history: Vec<RunStatus>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One end-to-end execution of an ordered task sequence.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    id: RunId,
    pipeline: String,
    tasks: Vec<String>,
    current_index: usize,
    status: RunStatus,
    progress: f64,
    error: Option<RunError>,
    records: Vec<TaskExecutionRecord>,
    write_summary: Option<FanoutSummary>,
    history: Vec<RunStatus>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(id: RunId, pipeline: impl Into<String>, tasks: Vec<String>) -> Self {
        Self {
            id,
            pipeline: pipeline.into(),
            tasks,
            current_index: 0,
            status: RunStatus::Pending,
            progress: 0.0,
            error: None,
            records: Vec::new(),
            write_summary: None,
            history: vec![RunStatus::Pending],
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn error(&self) -> Option<&RunError> {
        self.error.as_ref()
    }

    pub fn records(&self) -> &[TaskExecutionRecord] {
        &self.records
    }

    /// Item-level failures across all recorded tasks.
    pub fn items_failed(&self) -> usize {
        self.records.iter().map(|r| r.item_failures.len()).sum()
    }

    pub fn task_names(&self) -> &[String] {
        &self.tasks
    }

    /// Every status this run has held, in order.
    pub fn history(&self) -> &[RunStatus] {
        &self.history
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// The task currently executing, only while the run is processing.
    pub fn current_task(&self) -> Option<&str> {
        if self.status != RunStatus::Processing {
            return None;
        }
        self.tasks.get(self.current_index).map(String::as_str)
    }

    /// Moves the run to `to`, returning the previous status.
    pub fn transition(&mut self, to: RunStatus) -> Result<RunStatus, PipelineError> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(PipelineError::InvalidTransition { from, to });
        }
        let now = Utc::now();
        if to == RunStatus::Processing {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.ended_at = Some(now);
            if to == RunStatus::Completed {
                self.progress = 1.0;
            }
        }
        self.status = to;
        self.history.push(to);
        Ok(from)
    }

    /// Transitions to `Failed`, keeping the error for status queries.
    pub fn fail(&mut self, error: &PipelineError) -> Result<RunStatus, PipelineError> {
        let from = self.transition(RunStatus::Failed)?;
        self.error = Some(RunError::from(error));
        Ok(from)
    }

    pub fn begin_task(&mut self, index: usize) {
        self.current_index = index.min(self.tasks.len());
    }

    /// Appends a terminal task record and recomputes progress.
    pub fn record_task(&mut self, record: TaskExecutionRecord) {
        self.records.push(record);
        self.progress = if self.tasks.is_empty() {
            1.0
        } else {
            (self.records.len() as f64 / self.tasks.len() as f64).min(1.0)
        };
    }

    pub fn set_write_summary(&mut self, summary: FanoutSummary) {
        self.write_summary = Some(summary);
    }

    pub fn status_report(&self) -> RunStatusReport {
        RunStatusReport {
            run_id: self.id,
            pipeline: self.pipeline.clone(),
            status: self.status,
            progress: self.progress,
            current_task: self.current_task().map(str::to_string),
            error: self.error.clone(),
            items_failed: self.items_failed(),
            write_summary: self.write_summary.clone(),
            history: self.history.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(tasks: &[&str]) -> PipelineRun {
        PipelineRun::new(
            RunId::new(),
            "test",
            tasks.iter().map(|t| t.to_string()).collect(),
        )
    }

    fn record(task: &str, index: usize, outcome: TaskOutcome) -> TaskExecutionRecord {
        let now = Utc::now();
        TaskExecutionRecord {
            task: task.to_string(),
            index,
            attempts: 1,
            started_at: now,
            ended_at: now,
            outcome,
            errors: vec![],
            item_failures: vec![],
        }
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let mut run = run(&["a", "b"]);
        assert_eq!(run.status(), RunStatus::Pending);
        assert_eq!(run.current_task(), None);

        run.transition(RunStatus::Processing).unwrap();
        run.begin_task(0);
        assert_eq!(run.current_task(), Some("a"));

        run.record_task(record("a", 0, TaskOutcome::Success));
        assert_eq!(run.progress(), 0.5);

        run.begin_task(1);
        run.record_task(record("b", 1, TaskOutcome::Retried));
        run.transition(RunStatus::Completed).unwrap();

        assert_eq!(run.progress(), 1.0);
        assert_eq!(run.current_task(), None);
        assert!(run.ended_at().is_some());
        assert_eq!(
            run.history(),
            &[RunStatus::Pending, RunStatus::Processing, RunStatus::Completed]
        );
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        let mut run = run(&["a"]);
        run.transition(RunStatus::Processing).unwrap();
        run.transition(RunStatus::Cancelled).unwrap();

        for next in [
            RunStatus::Pending,
            RunStatus::Processing,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            let err = run.transition(next).unwrap_err();
            assert_eq!(
                err,
                PipelineError::InvalidTransition {
                    from: RunStatus::Cancelled,
                    to: next
                }
            );
        }
        assert_eq!(run.status(), RunStatus::Cancelled);
    }

    #[test]
    fn test_processing_cannot_return_to_pending() {
        let mut run = run(&["a"]);
        run.transition(RunStatus::Processing).unwrap();
        assert!(run.transition(RunStatus::Pending).is_err());
        assert!(run.transition(RunStatus::Processing).is_err());
    }

    #[test]
    fn test_fail_keeps_most_specific_error() {
        let mut run = run(&["a"]);
        run.transition(RunStatus::Processing).unwrap();
        let error = PipelineError::TaskFailed {
            task: "a".into(),
            attempts: 3,
            source: crate::errors::TaskError::Failed("boom".into()),
        };
        run.fail(&error).unwrap();

        let report = run.status_report();
        assert_eq!(report.status, RunStatus::Failed);
        let run_error = report.error.unwrap();
        assert_eq!(run_error.task.as_deref(), Some("a"));
        assert_eq!(run_error.class, ErrorClass::Transient);
        assert!(run_error.message.contains("boom"));
    }

    #[test]
    fn test_item_failures_surface_in_report() {
        let mut run = run(&["embed"]);
        run.transition(RunStatus::Processing).unwrap();
        let mut embed = record("embed", 0, TaskOutcome::Success);
        embed.item_failures = vec![ItemFailure::new(
            "c1",
            &crate::errors::ProviderError::EmptyVectorReturned,
        )];
        run.record_task(embed);

        let report = run.status_report();
        assert_eq!(report.items_failed, 1);
        assert_eq!(run.records()[0].item_failures[0].class, ErrorClass::Data);
    }

    #[test]
    fn test_empty_pipeline_progress_is_complete() {
        let mut run = run(&[]);
        run.transition(RunStatus::Processing).unwrap();
        run.transition(RunStatus::Completed).unwrap();
        assert_eq!(run.progress(), 1.0);
    }
}
