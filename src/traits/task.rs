use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::engine::context::RunContext;
use crate::errors::TaskError;
use crate::model::{TaskData, WorkItem};

/// A finite stream of work items produced by one task invocation.
///
/// A stream that yields an error fails the whole invocation; it is not resumed,
/// the task is re-invoked from its checkpoint instead.
pub type WorkItemStream = BoxStream<'static, Result<WorkItem, TaskError>>;

/// What a task invocation hands to the next task.
pub enum TaskOutput {
    Value(serde_json::Value),
    Items(WorkItemStream),
}

impl TaskOutput {
    pub fn items(items: Vec<WorkItem>) -> Self {
        TaskOutput::Items(stream::iter(items.into_iter().map(Ok)).boxed())
    }

    /// Drains the output into the data passed to the next task.
    pub async fn collect(self) -> Result<TaskData, TaskError> {
        match self {
            TaskOutput::Value(value) => Ok(TaskData::Value(value)),
            TaskOutput::Items(stream) => Ok(TaskData::Items(stream.try_collect().await?)),
        }
    }
}

impl std::fmt::Debug for TaskOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutput::Value(value) => f.debug_tuple("Value").field(value).finish(),
            TaskOutput::Items(_) => f.write_str("Items(<stream>)"),
        }
    }
}

/// A named, stateless transformation step.
///
/// Implementations must not keep mutable state between invocations: the
/// orchestrator re-invokes a task from its last committed input on retry and may
/// run several instances of a parallel-safe task at once.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    /// Partitions of this task's input may run concurrently.
    fn parallel_safe(&self) -> bool {
        false
    }

    /// This task's item input may be split into partitions and its outputs concatenated.
    fn batch_compatible(&self) -> bool {
        false
    }

    async fn execute(&self, input: TaskData, ctx: &RunContext) -> Result<TaskOutput, TaskError>;
}
