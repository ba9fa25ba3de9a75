pub mod context;
pub mod dispatcher;
pub mod fanout;
pub mod orchestrator;
pub mod registry;
pub mod run;
#[cfg(test)]
pub mod integration_tests;

pub use context::RunContext;
pub use dispatcher::{DispatchSettings, EmbeddingDispatcher};
pub use fanout::{
    BackendWriteOutcome, BackendWriteStatus, FanoutLedger, FanoutSettings, FanoutSummary,
    HealthReport, StorageBackends, StorageCoordinator, WriteOutcome,
};
pub use orchestrator::{Orchestrator, OrchestratorSettings, Pipeline, RunHandle, RunResult};
pub use registry::RunRegistry;
pub use run::{
    PipelineRun, RunError, RunId, RunStatus, RunStatusReport, TaskExecutionRecord, TaskOutcome,
};
