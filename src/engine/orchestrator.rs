// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pipeline orchestration: runs an ordered task list against one input and tracks
//! the run through its lifecycle.
//!
//! A run moves `PENDING -> PROCESSING -> {COMPLETED | FAILED | CANCELLED}` and
//! never leaves a terminal state. Before any task runs, every storage backend
//! must answer its health check. Each task is then invoked with the previous
//! task's committed output (its checkpoint). A failed invocation is retried from
//! that checkpoint, never from scratch.
//!
//! Item input to a task that is batch-compatible or parallel-safe is split into
//! partitions. Parallel-safe tasks run up to `task_parallel_concurrency_limit`
//! partitions at once; the rest run them one after another. Partition outputs
//! are concatenated in input order and only failed partitions are re-invoked.
//!
//! Cancellation is cooperative and observed at task boundaries. A task already
//! running when cancellation arrives is allowed to finish, but its output is
//! discarded and the next task never starts.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::consts::{
    DEFAULT_PARTIAL_FAILURE_THRESHOLD, DEFAULT_RUN_RETENTION_SECS,
    DEFAULT_TASK_PARALLEL_CONCURRENCY_LIMIT, DEFAULT_TASK_PARTITION_SIZE,
};
use crate::engine::context::RunContext;
use crate::engine::dispatcher::EmbeddingDispatcher;
use crate::engine::fanout::StorageCoordinator;
use crate::engine::registry::{RunRegistry, SharedRun};
use crate::engine::run::{
    ItemFailure, PipelineRun, RunId, RunStatus, RunStatusReport, TaskExecutionRecord,
    TaskOutcome,
};
use crate::errors::{PipelineError, TaskError};
use crate::model::{TaskData, WorkItem};
use crate::observability::messages::run::{
    CancellationObserved, RunSubmitted, RunTransitioned, TaskFinished, TaskRetrying,
};
use crate::observability::messages::StructuredLog;
use crate::resilience::{GiveUpReason, RetryDecision, RetryOutcome, RetryPolicy};
use crate::traits::Task;

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub task_parallel_concurrency_limit: usize,
    /// Items per partition when a task's item input is split.
    pub task_partition_size: usize,
    /// Fraction of failed write batches above which a run fails.
    pub partial_failure_threshold: f64,
    /// How long terminal runs stay queryable.
    pub run_retention: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            task_parallel_concurrency_limit: DEFAULT_TASK_PARALLEL_CONCURRENCY_LIMIT,
            task_partition_size: DEFAULT_TASK_PARTITION_SIZE,
            partial_failure_threshold: DEFAULT_PARTIAL_FAILURE_THRESHOLD,
            run_retention: Duration::from_secs(DEFAULT_RUN_RETENTION_SECS),
        }
    }
}

/// A named, ordered list of tasks.
#[derive(Clone)]
pub struct Pipeline {
    name: String,
    tasks: Vec<Arc<dyn Task>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: Arc<dyn Task>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tasks(&self) -> &[Arc<dyn Task>] {
        &self.tasks
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name().to_string()).collect()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("tasks", &self.task_names())
            .finish()
    }
}

/// Final report of a run plus the last task's output when it completed.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub report: RunStatusReport,
    pub output: Option<TaskData>,
}

/// Handle to a run executing in the background.
pub struct RunHandle {
    run_id: RunId,
    join: JoinHandle<RunResult>,
    orchestrator: Orchestrator,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Waits for the run to reach a terminal state.
    pub async fn wait(self) -> Result<RunResult, PipelineError> {
        match self.join.await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::error!(run_id = %self.run_id, error = %e, "pipeline run task aborted");
                Ok(RunResult {
                    report: self.orchestrator.get_status(self.run_id)?,
                    output: None,
                })
            }
        }
    }
}

struct OrchestratorInner {
    dispatcher: Arc<EmbeddingDispatcher>,
    storage: Arc<StorageCoordinator>,
    retry: RetryPolicy,
    settings: OrchestratorSettings,
    registry: RunRegistry,
}

/// Runs pipelines and answers status queries about them.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

/// Output of one successful invocation, with the items it gave up on.
struct Invocation {
    data: TaskData,
    item_failures: Vec<ItemFailure>,
}

/// Result of running one task to its terminal outcome.
struct TaskRun {
    result: Result<TaskData, TaskError>,
    attempts: u32,
    errors: Vec<String>,
    item_failures: Vec<ItemFailure>,
    cancelled: bool,
}

impl Orchestrator {
    pub fn new(
        dispatcher: Arc<EmbeddingDispatcher>,
        storage: Arc<StorageCoordinator>,
        retry: RetryPolicy,
        mut settings: OrchestratorSettings,
    ) -> Self {
        settings.task_parallel_concurrency_limit = settings.task_parallel_concurrency_limit.max(1);
        settings.task_partition_size = settings.task_partition_size.max(1);
        let registry = RunRegistry::new(settings.run_retention);
        Self {
            inner: Arc::new(OrchestratorInner {
                dispatcher,
                storage,
                retry,
                settings,
                registry,
            }),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    pub fn dispatcher(&self) -> &Arc<EmbeddingDispatcher> {
        &self.inner.dispatcher
    }

    /// Registers a run and executes it in the background.
    pub fn submit(&self, pipeline: Pipeline, input: TaskData) -> RunHandle {
        let (run_id, run, cancel) = self.register(&pipeline);
        let orchestrator = self.clone();
        let span = RunSubmitted {
            run_id,
            pipeline: pipeline.name(),
            task_count: pipeline.tasks().len(),
        }
        .span("execute");
        let join = tokio::spawn(
            async move { orchestrator.execute(&pipeline, input, run, cancel).await }
                .instrument(span),
        );
        RunHandle {
            run_id,
            join,
            orchestrator: self.clone(),
        }
    }

    /// Registers a run and executes it on the current task.
    pub async fn run(&self, pipeline: &Pipeline, input: TaskData) -> RunResult {
        let (run_id, run, cancel) = self.register(pipeline);
        let span = RunSubmitted {
            run_id,
            pipeline: pipeline.name(),
            task_count: pipeline.tasks().len(),
        }
        .span("execute");
        self.execute(pipeline, input, run, cancel)
            .instrument(span)
            .await
    }

    pub fn get_status(&self, run_id: RunId) -> Result<RunStatusReport, PipelineError> {
        self.inner.registry.status(run_id)
    }

    pub fn records(&self, run_id: RunId) -> Result<Vec<TaskExecutionRecord>, PipelineError> {
        self.inner.registry.records(run_id)
    }

    /// Requests cooperative cancellation; returns the run's status at request time.
    pub fn cancel(&self, run_id: RunId) -> Result<RunStatus, PipelineError> {
        self.inner.registry.cancel(run_id)
    }

    pub fn prune_expired(&self) -> usize {
        self.inner.registry.prune_expired()
    }

    fn register(&self, pipeline: &Pipeline) -> (RunId, SharedRun, CancellationToken) {
        self.inner.registry.prune_expired();
        let run_id = RunId::new();
        let cancel = CancellationToken::new();
        let run = PipelineRun::new(run_id, pipeline.name(), pipeline.task_names());
        let shared = self.inner.registry.insert(run, cancel.clone());
        RunSubmitted {
            run_id,
            pipeline: pipeline.name(),
            task_count: pipeline.tasks().len(),
        }
        .log();
        (run_id, shared, cancel)
    }

    async fn execute(
        &self,
        pipeline: &Pipeline,
        input: TaskData,
        run: SharedRun,
        cancel: CancellationToken,
    ) -> RunResult {
        let run_id = run.read().id();
        let tasks = pipeline.tasks();

        if cancel.is_cancelled() {
            return self.finish_cancelled(&run, tasks.first().map(|t| t.name()));
        }

        let health = self.inner.storage.health_check().await;
        if !health.all_reachable() {
            let err = PipelineError::BackendUnreachable {
                backends: health.unreachable(),
            };
            return self.finish_failed(&run, &err);
        }

        self.transition(&run, RunStatus::Processing);

        let ctx = RunContext::new(
            run_id,
            self.inner.dispatcher.clone(),
            self.inner.storage.clone(),
            cancel.clone(),
        );
        let mut checkpoint = input;

        for (index, task) in tasks.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.finish_cancelled(&run, Some(task.name()));
            }
            run.write().begin_task(index);

            let started_at = Utc::now();
            let clock = Instant::now();
            let task_run = self.run_task(task, &checkpoint, &ctx).await;

            let outcome = match (&task_run.result, task_run.attempts) {
                (Ok(_), 1) => TaskOutcome::Success,
                (Ok(_), _) => TaskOutcome::Retried,
                (Err(_), _) => TaskOutcome::Failed,
            };
            TaskFinished {
                run_id,
                task: task.name(),
                outcome,
                attempts: task_run.attempts,
                duration: clock.elapsed(),
            }
            .log();
            {
                let mut guard = run.write();
                guard.record_task(TaskExecutionRecord {
                    task: task.name().to_string(),
                    index,
                    attempts: task_run.attempts,
                    started_at,
                    ended_at: Utc::now(),
                    outcome,
                    errors: task_run.errors,
                    item_failures: task_run.item_failures,
                });
                guard.set_write_summary(ctx.write_summary());
            }

            let output = match task_run.result {
                Ok(output) => output,
                Err(_) if task_run.cancelled || cancel.is_cancelled() => {
                    return self.finish_cancelled(&run, tasks.get(index + 1).map(|t| t.name()));
                }
                Err(source) => {
                    let err = PipelineError::TaskFailed {
                        task: task.name().to_string(),
                        attempts: task_run.attempts,
                        source,
                    };
                    return self.finish_failed(&run, &err);
                }
            };

            if let Err(err) = ctx
                .ledger()
                .check_threshold(self.inner.settings.partial_failure_threshold)
            {
                return self.finish_failed(&run, &err);
            }

            if cancel.is_cancelled() {
                return self.finish_cancelled(&run, tasks.get(index + 1).map(|t| t.name()));
            }
            checkpoint = output;
        }

        self.transition(&run, RunStatus::Completed);
        RunResult {
            report: run.read().status_report(),
            output: Some(checkpoint),
        }
    }

    /// Runs `task` on `checkpoint`, retrying failed invocations from it.
    async fn run_task(
        &self,
        task: &Arc<dyn Task>,
        checkpoint: &TaskData,
        ctx: &RunContext,
    ) -> TaskRun {
        let settings = &self.inner.settings;
        let partition = task.batch_compatible() || task.parallel_safe();
        let items = match checkpoint {
            TaskData::Items(items) if partition && items.len() > settings.task_partition_size => {
                items
            }
            _ => {
                let outcome = self.invoke_with_retry(task, checkpoint, ctx).await;
                return TaskRun::from(outcome);
            }
        };

        let concurrency = if task.parallel_safe() {
            settings.task_parallel_concurrency_limit
        } else {
            1
        };
        tracing::debug!(
            run_id = %ctx.run_id(),
            task = task.name(),
            items = items.len(),
            partition_size = settings.task_partition_size,
            concurrency,
            "partitioning task input"
        );

        let partitions: Vec<TaskData> = items
            .chunks(settings.task_partition_size)
            .map(|chunk| TaskData::Items(chunk.to_vec()))
            .collect();

        let outcomes: Vec<RetryOutcome<Invocation, TaskError>> = stream::iter(partitions)
            .map(|partition| async move { self.invoke_with_retry(task, &partition, ctx).await })
            .buffered(concurrency)
            .collect()
            .await;

        let mut attempts = 0;
        let mut errors = Vec::new();
        let mut item_failures = Vec::new();
        let mut merged = Vec::with_capacity(outcomes.len());
        let mut failure: Option<TaskError> = None;
        let mut cancelled = false;
        for outcome in outcomes {
            attempts = attempts.max(outcome.attempts);
            errors.extend(outcome.errors.iter().map(ToString::to_string));
            cancelled |= outcome.gave_up == Some(GiveUpReason::Cancelled);
            match outcome.result {
                Ok(invocation) => {
                    item_failures.extend(invocation.item_failures);
                    merged.push(invocation.data);
                }
                Err(err) => {
                    errors.push(err.to_string());
                    failure.get_or_insert(err);
                }
            }
        }

        TaskRun {
            result: match failure {
                Some(err) => Err(err),
                None => Ok(merge_partitions(merged)),
            },
            attempts,
            errors,
            item_failures,
            cancelled,
        }
    }

    async fn invoke_with_retry(
        &self,
        task: &Arc<dyn Task>,
        input: &TaskData,
        ctx: &RunContext,
    ) -> RetryOutcome<Invocation, TaskError> {
        let retry = &self.inner.retry;
        retry
            .run(Some(ctx.cancellation()), |attempt| {
                let input = input.clone();
                async move {
                    let result = invoke(task.as_ref(), input, ctx).await;
                    if let Err(err) = &result {
                        if let RetryDecision::Retry { .. } = retry.decide(err, attempt) {
                            TaskRetrying {
                                run_id: ctx.run_id(),
                                task: task.name(),
                                attempt,
                                error: err,
                            }
                            .log();
                        }
                    }
                    result
                }
            })
            .await
    }

    fn transition(&self, run: &SharedRun, to: RunStatus) {
        let mut guard = run.write();
        let run_id = guard.id();
        match guard.transition(to) {
            Ok(from) => RunTransitioned { run_id, from, to }.log(),
            Err(e) => tracing::warn!(run_id = %run_id, error = %e, "ignored run transition"),
        }
    }

    fn finish_failed(&self, run: &SharedRun, err: &PipelineError) -> RunResult {
        let mut guard = run.write();
        let run_id = guard.id();
        match guard.fail(err) {
            Ok(from) => RunTransitioned {
                run_id,
                from,
                to: RunStatus::Failed,
            }
            .log(),
            Err(e) => tracing::warn!(run_id = %run_id, error = %e, "ignored run transition"),
        }
        tracing::error!(run_id = %run_id, error = %err, "pipeline run failed");
        RunResult {
            report: guard.status_report(),
            output: None,
        }
    }

    fn finish_cancelled(&self, run: &SharedRun, next_task: Option<&str>) -> RunResult {
        let run_id = run.read().id();
        CancellationObserved { run_id, next_task }.log();
        self.transition(run, RunStatus::Cancelled);
        RunResult {
            report: run.read().status_report(),
            output: None,
        }
    }
}

impl From<RetryOutcome<Invocation, TaskError>> for TaskRun {
    fn from(outcome: RetryOutcome<Invocation, TaskError>) -> Self {
        let mut errors: Vec<String> = outcome.errors.iter().map(ToString::to_string).collect();
        let (result, item_failures) = match outcome.result {
            Ok(invocation) => (Ok(invocation.data), invocation.item_failures),
            Err(err) => {
                errors.push(err.to_string());
                (Err(err), Vec::new())
            }
        };
        TaskRun {
            cancelled: outcome.gave_up == Some(GiveUpReason::Cancelled),
            result,
            attempts: outcome.attempts,
            errors,
            item_failures,
        }
    }
}

/// One invocation: execute, then drain the output. A panic inside the task
/// becomes [`TaskError::Aborted`]. Item failures reported by a failed
/// invocation are dropped along with it.
async fn invoke(
    task: &dyn Task,
    input: TaskData,
    ctx: &RunContext,
) -> Result<Invocation, TaskError> {
    let ctx = ctx.for_invocation();
    let call = async { task.execute(input, &ctx).await?.collect().await };
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result.map(|data| Invocation {
            data,
            item_failures: ctx.take_item_failures(),
        }),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(TaskError::Aborted(message))
        }
    }
}

/// Concatenates partition outputs in input order. Item outputs stay items; if
/// any partition produced a plain value, all outputs become one JSON array.
fn merge_partitions(outputs: Vec<TaskData>) -> TaskData {
    if outputs.iter().all(|o| matches!(o, TaskData::Items(_))) {
        let items: Vec<WorkItem> = outputs
            .into_iter()
            .filter_map(TaskData::into_items)
            .flatten()
            .collect();
        return TaskData::Items(items);
    }
    let mut values = Vec::new();
    for output in outputs {
        match output {
            TaskData::Value(serde_json::Value::Array(array)) => values.extend(array),
            TaskData::Value(value) => values.push(value),
            TaskData::Items(items) => values.extend(
                items
                    .iter()
                    .filter_map(|item| serde_json::to_value(item).ok()),
            ),
        }
    }
    TaskData::Value(serde_json::Value::Array(values))
}
