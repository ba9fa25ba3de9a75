// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::backends::hashing::HashingProvider;
use crate::backends::local::EmbedChunksTask;
use crate::backends::memory::{FailureMode, MemoryStores};
use crate::backends::stub::{
    quick_retry, ConcurrencyProbeProvider, ScriptedProvider, ScriptedResponse, StubTask,
};
use crate::config::{PipelineConfig, RuntimeBuilder};
use crate::engine::{
    DispatchSettings, EmbeddingDispatcher, FanoutSettings, Orchestrator, OrchestratorSettings,
    Pipeline, RunId, RunStatus, StorageCoordinator, TaskOutcome,
};
use crate::errors::{ErrorClass, PipelineError, TaskError};
use crate::model::{EmbeddingRequest, TaskData, WorkItem};
use crate::traits::EmbeddingProvider;

/// Integration tests for the orchestrator, dispatcher and fan-out working together
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn create_orchestrator(
        stores: &MemoryStores,
        max_attempts: u32,
        settings: OrchestratorSettings,
    ) -> Orchestrator {
        create_orchestrator_with_provider(
            Arc::new(HashingProvider::default()),
            DispatchSettings::default(),
            stores,
            max_attempts,
            settings,
        )
    }

    fn create_orchestrator_with_provider(
        provider: Arc<dyn EmbeddingProvider>,
        dispatch: DispatchSettings,
        stores: &MemoryStores,
        max_attempts: u32,
        settings: OrchestratorSettings,
    ) -> Orchestrator {
        let dispatcher = EmbeddingDispatcher::new(provider, dispatch, quick_retry(max_attempts));
        let storage = StorageCoordinator::new(
            stores.backends(),
            quick_retry(max_attempts),
            FanoutSettings::default(),
        );
        Orchestrator::new(
            Arc::new(dispatcher),
            Arc::new(storage),
            quick_retry(max_attempts),
            settings,
        )
    }

    fn items(n: usize) -> TaskData {
        TaskData::Items(
            (0..n)
                .map(|i| WorkItem::text(format!("item-{}", i), "doc", format!("text {}", i)))
                .collect(),
        )
    }

    fn item_ids(data: TaskData) -> Vec<String> {
        data.into_items()
            .expect("expected item output")
            .into_iter()
            .map(|item| item.id)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_third_task_stops_the_run() {
        let stores = MemoryStores::new();
        let orchestrator = create_orchestrator(&stores, 3, OrchestratorSettings::default());

        let t1 = Arc::new(StubTask::new("t1"));
        let t2 = Arc::new(StubTask::new("t2"));
        let t3 = Arc::new(
            StubTask::new("t3").always_failing(TaskError::Failed("downstream timeout".into())),
        );
        let t4 = Arc::new(StubTask::new("t4"));
        let pipeline = Pipeline::new("four")
            .with_task(t1.clone())
            .with_task(t2.clone())
            .with_task(t3.clone())
            .with_task(t4.clone());

        let result = orchestrator.run(&pipeline, items(2)).await;
        let report = result.report;

        assert_eq!(report.status, RunStatus::Failed);
        assert!(result.output.is_none());
        assert_eq!(t3.invocations(), 3);
        assert_eq!(t4.invocations(), 0, "no task after the failure may run");

        let records = orchestrator.records(report.run_id).unwrap();
        let outcomes: Vec<TaskOutcome> = records.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![TaskOutcome::Success, TaskOutcome::Success, TaskOutcome::Failed]
        );
        assert_eq!(records[2].attempts, 3);
        assert_eq!(records[2].errors.len(), 3);

        let error = report.error.expect("failed run carries its error");
        assert_eq!(error.task.as_deref(), Some("t3"));
        assert!(error.message.contains("downstream timeout"));
        assert!((report.progress - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_succeeding_after_retries_is_marked_retried() {
        let stores = MemoryStores::new();
        let orchestrator = create_orchestrator(&stores, 3, OrchestratorSettings::default());
        let flaky = Arc::new(
            StubTask::new("flaky").failing_first(2, TaskError::Failed("blip".into())),
        );
        let pipeline = Pipeline::new("retry").with_task(flaky.clone());

        let result = orchestrator.run(&pipeline, items(1)).await;

        assert_eq!(result.report.status, RunStatus::Completed);
        assert_eq!(item_ids(result.output.unwrap()), vec!["item-0"]);
        let records = orchestrator.records(result.report.run_id).unwrap();
        assert_eq!(records[0].outcome, TaskOutcome::Retried);
        assert_eq!(records[0].attempts, 3);
        assert_eq!(records[0].errors.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_task_error_is_not_retried() {
        let stores = MemoryStores::new();
        let orchestrator = create_orchestrator(&stores, 5, OrchestratorSettings::default());
        let task = Arc::new(
            StubTask::new("parse").always_failing(TaskError::MalformedInput("not json".into())),
        );
        let pipeline = Pipeline::new("fatal").with_task(task.clone());

        let result = orchestrator.run(&pipeline, items(1)).await;

        assert_eq!(result.report.status, RunStatus::Failed);
        assert_eq!(task.invocations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_second_task() {
        let stores = MemoryStores::new();
        let orchestrator = create_orchestrator(&stores, 3, OrchestratorSettings::default());
        let t1 = Arc::new(StubTask::new("t1"));
        let t2 = Arc::new(StubTask::new("t2").with_delay(Duration::from_secs(10)));
        let t3 = Arc::new(StubTask::new("t3"));
        let pipeline = Pipeline::new("cancel")
            .with_task(t1.clone())
            .with_task(t2.clone())
            .with_task(t3.clone());

        let handle = orchestrator.submit(pipeline, items(3));
        let run_id = handle.run_id();

        loop {
            let status = orchestrator.get_status(run_id).unwrap();
            if status.current_task.as_deref() == Some("t2") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(orchestrator.cancel(run_id).unwrap(), RunStatus::Processing);

        let result = handle.wait().await.unwrap();
        assert_eq!(result.report.status, RunStatus::Cancelled);
        assert!(result.output.is_none(), "output of the in-flight task is discarded");
        assert_eq!(t2.invocations(), 1);
        assert_eq!(t3.invocations(), 0);

        // Cancelling a terminal run is a no-op that reports the final status.
        assert_eq!(orchestrator.cancel(run_id).unwrap(), RunStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_backend_fails_before_any_task() {
        let stores = MemoryStores::new();
        stores.vector.set_failure(FailureMode::Unreachable);
        let orchestrator = create_orchestrator(&stores, 3, OrchestratorSettings::default());
        let task = Arc::new(StubTask::new("never"));
        let pipeline = Pipeline::new("health").with_task(task.clone());

        let result = orchestrator.run(&pipeline, items(1)).await;

        assert_eq!(result.report.status, RunStatus::Failed);
        assert!(result.report.started_at.is_none());
        assert_eq!(task.invocations(), 0);
        assert!(orchestrator.records(result.report.run_id).unwrap().is_empty());
        assert!(result.report.error.unwrap().message.contains("vector"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_graph_failure_exceeds_threshold() {
        let config = PipelineConfig {
            max_attempts: 2,
            partial_failure_threshold: 0.5,
            ..PipelineConfig::default()
        };
        let runtime = RuntimeBuilder::from_config(&config).unwrap();
        runtime.stores.graph.set_failure(FailureMode::Unavailable);

        let input = TaskData::Value(json!(["Ada Lovelace wrote notes about Charles Babbage."]));
        let result = runtime.orchestrator.run(&runtime.pipeline, input).await;

        assert_eq!(result.report.status, RunStatus::Failed);
        let error = result.report.error.unwrap();
        assert!(error.message.contains("threshold"));
        // Vector and relational writes are kept even though graph failed.
        assert!(!runtime.stores.vector.is_empty());
        assert!(!runtime.stores.relational.is_empty());
        assert!(runtime.stores.graph.is_empty());

        let summary = result.report.write_summary.unwrap();
        assert_eq!(summary.failed_batches, summary.batches);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graph_failure_within_threshold_completes() {
        let config = PipelineConfig {
            max_attempts: 2,
            partial_failure_threshold: 1.0,
            ..PipelineConfig::default()
        };
        let runtime = RuntimeBuilder::from_config(&config).unwrap();
        runtime.stores.graph.set_failure(FailureMode::Unavailable);

        let input = TaskData::Value(json!(["Ada Lovelace wrote notes about Charles Babbage."]));
        let result = runtime.orchestrator.run(&runtime.pipeline, input).await;

        assert_eq!(result.report.status, RunStatus::Completed);
        let summary = result.report.write_summary.unwrap();
        assert_eq!(summary.failed_batches, 1);
        assert!(summary.records_failed > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_partitions_respect_limit_and_order() {
        let stores = MemoryStores::new();
        let settings = OrchestratorSettings {
            task_parallel_concurrency_limit: 3,
            task_partition_size: 2,
            ..OrchestratorSettings::default()
        };
        let orchestrator = create_orchestrator(&stores, 3, settings);
        let task = Arc::new(
            StubTask::new("fan")
                .parallel()
                .with_delay(Duration::from_millis(50)),
        );
        let pipeline = Pipeline::new("partitions").with_task(task.clone());

        let result = orchestrator.run(&pipeline, items(10)).await;

        assert_eq!(result.report.status, RunStatus::Completed);
        assert_eq!(task.invocations(), 5);
        assert_eq!(task.input_sizes(), vec![2; 5]);
        assert_eq!(task.max_in_flight(), 3);
        let expected: Vec<String> = (0..10).map(|i| format!("item-{}", i)).collect();
        assert_eq!(item_ids(result.output.unwrap()), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batched_task_runs_partitions_sequentially() {
        let stores = MemoryStores::new();
        let settings = OrchestratorSettings {
            task_parallel_concurrency_limit: 4,
            task_partition_size: 3,
            ..OrchestratorSettings::default()
        };
        let orchestrator = create_orchestrator(&stores, 3, settings);
        let task = Arc::new(
            StubTask::new("batch")
                .batched()
                .with_delay(Duration::from_millis(20)),
        );
        let pipeline = Pipeline::new("sequential").with_task(task.clone());

        let result = orchestrator.run(&pipeline, items(7)).await;

        assert_eq!(result.report.status, RunStatus::Completed);
        assert_eq!(task.input_sizes(), vec![3, 3, 1]);
        assert_eq!(task.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_failed_partition_is_retried() {
        let stores = MemoryStores::new();
        let settings = OrchestratorSettings {
            task_partition_size: 2,
            ..OrchestratorSettings::default()
        };
        let orchestrator = create_orchestrator(&stores, 3, settings);
        let task = Arc::new(
            StubTask::new("batch")
                .batched()
                .failing_first(1, TaskError::Failed("blip".into())),
        );
        let pipeline = Pipeline::new("partial-retry").with_task(task.clone());

        let result = orchestrator.run(&pipeline, items(10)).await;

        assert_eq!(result.report.status, RunStatus::Completed);
        assert_eq!(task.invocations(), 6);
        let records = orchestrator.records(result.report.run_id).unwrap();
        assert_eq!(records[0].outcome, TaskOutcome::Retried);
        assert_eq!(records[0].attempts, 2);
        assert_eq!(item_ids(result.output.unwrap()).len(), 10);
    }

    #[tokio::test]
    async fn test_panicking_task_is_aborted_not_retried() {
        let stores = MemoryStores::new();
        let orchestrator = create_orchestrator(&stores, 3, OrchestratorSettings::default());
        let task = Arc::new(StubTask::new("boom").panicking());
        let after = Arc::new(StubTask::new("after"));
        let pipeline = Pipeline::new("panic")
            .with_task(task.clone())
            .with_task(after.clone());

        let result = orchestrator.run(&pipeline, items(1)).await;

        assert_eq!(result.report.status, RunStatus::Failed);
        assert_eq!(task.invocations(), 1);
        assert_eq!(after.invocations(), 0);
        assert!(result.report.error.unwrap().message.contains("panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_built_in_pipeline_end_to_end() {
        let runtime = RuntimeBuilder::from_config(&PipelineConfig::default()).unwrap();
        let input = TaskData::Value(json!([
            "Ada Lovelace worked with Charles Babbage on the Analytical Engine.",
            "Grace Hopper built the first compiler."
        ]));

        let handle = runtime.orchestrator.submit(runtime.pipeline.clone(), input);
        let run_id = handle.run_id();
        let result = handle.wait().await.unwrap();

        assert_eq!(result.report.status, RunStatus::Completed);
        assert!((result.report.progress - 1.0).abs() < f64::EPSILON);
        assert!(result.report.current_task.is_none());
        assert!(!runtime.stores.graph.is_empty());
        assert_eq!(runtime.stores.vector.len(), runtime.stores.relational.len());
        assert!(runtime.stores.relational.len() >= 2);

        let summary = result.report.write_summary.unwrap();
        assert!(summary.batches >= 1);
        assert_eq!(summary.failed_batches, 0);

        let records = runtime.orchestrator.records(run_id).unwrap();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.outcome == TaskOutcome::Success));
    }

    #[tokio::test]
    async fn test_status_of_unknown_run() {
        let stores = MemoryStores::new();
        let orchestrator = create_orchestrator(&stores, 3, OrchestratorSettings::default());
        let run_id = RunId::new();

        assert_eq!(
            orchestrator.get_status(run_id),
            Err(PipelineError::RunNotFound(run_id))
        );
        assert_eq!(
            orchestrator.cancel(run_id),
            Err(PipelineError::RunNotFound(run_id))
        );
    }

    #[tokio::test]
    async fn test_empty_pipeline_completes_with_input() {
        let stores = MemoryStores::new();
        let orchestrator = create_orchestrator(&stores, 3, OrchestratorSettings::default());

        let result = orchestrator
            .run(&Pipeline::new("empty"), TaskData::Value(json!("as-is")))
            .await;

        assert_eq!(result.report.status, RunStatus::Completed);
        assert_eq!(result.output, Some(TaskData::Value(json!("as-is"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_embeddings_are_counted_on_the_run() {
        let stores = MemoryStores::new();
        // The first batch keeps coming back with a hole; the second is clean.
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedResponse::EmptyAt(0); 3]));
        let dispatch = DispatchSettings {
            concurrency_limit: 1,
            batch_size: 2,
            ..DispatchSettings::default()
        };
        let orchestrator = create_orchestrator_with_provider(
            provider.clone(),
            dispatch,
            &stores,
            3,
            OrchestratorSettings::default(),
        );
        let pipeline = Pipeline::new("embed").with_task(Arc::new(EmbedChunksTask::default()));

        let result = orchestrator.run(&pipeline, items(4)).await;

        assert_eq!(result.report.status, RunStatus::Completed);
        assert_eq!(result.report.items_failed, 2);
        assert_eq!(provider.calls(), 4);
        assert_eq!(
            item_ids(result.output.unwrap()),
            vec!["item-2".to_string(), "item-3".to_string()]
        );

        let records = orchestrator.records(result.report.run_id).unwrap();
        assert_eq!(records[0].outcome, TaskOutcome::Success);
        let failed: Vec<&str> = records[0]
            .item_failures
            .iter()
            .map(|f| f.item_id.as_str())
            .collect();
        assert_eq!(failed, vec!["item-0", "item-1"]);
        assert!(records[0]
            .item_failures
            .iter()
            .all(|f| f.class == ErrorClass::Data));
    }

    #[tokio::test(start_paused = true)]
    async fn test_embedding_retries_are_not_repeated_by_the_orchestrator() {
        let stores = MemoryStores::new();
        let provider = Arc::new(ScriptedProvider::always(ScriptedResponse::EmptyVectors));
        let orchestrator = create_orchestrator_with_provider(
            provider.clone(),
            DispatchSettings::default(),
            &stores,
            3,
            OrchestratorSettings::default(),
        );
        let pipeline = Pipeline::new("embed").with_task(Arc::new(EmbedChunksTask::default()));

        let result = orchestrator.run(&pipeline, items(2)).await;

        assert_eq!(result.report.status, RunStatus::Failed);
        assert_eq!(provider.calls(), 3, "only the dispatcher retries the batch");
        let records = orchestrator.records(result.report.run_id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attempts, 1);
        assert_eq!(records[0].outcome, TaskOutcome::Failed);
        assert_eq!(result.report.error.unwrap().class, ErrorClass::Data);
    }

    proptest! {
        #[test]
        fn prop_run_history_is_monotonic(succeeds in prop::collection::vec(any::<bool>(), 1..6)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();
            let stores = MemoryStores::new();
            let orchestrator = create_orchestrator(&stores, 2, OrchestratorSettings::default());

            let tasks: Vec<Arc<StubTask>> = succeeds
                .iter()
                .enumerate()
                .map(|(i, ok)| {
                    let task = StubTask::new(&format!("t{}", i));
                    let task = if *ok {
                        task
                    } else {
                        task.always_failing(TaskError::Failed("scripted".into()))
                    };
                    Arc::new(task)
                })
                .collect();
            let pipeline = tasks
                .iter()
                .fold(Pipeline::new("prop"), |pipeline, task| pipeline.with_task(task.clone()));

            let result = rt.block_on(orchestrator.run(&pipeline, items(2)));
            let report = result.report;

            let ranks: Vec<u8> = report.history.iter().map(|s| s.rank()).collect();
            prop_assert!(ranks.windows(2).all(|w| w[0] < w[1]));

            let first_failure = succeeds.iter().position(|ok| !ok);
            let expected_end = if first_failure.is_some() {
                RunStatus::Failed
            } else {
                RunStatus::Completed
            };
            prop_assert_eq!(
                report.history.clone(),
                vec![RunStatus::Pending, RunStatus::Processing, expected_end]
            );
            prop_assert_eq!(report.status, expected_end);

            let executed = first_failure.map_or(tasks.len(), |i| i + 1);
            let records = orchestrator.records(report.run_id).unwrap();
            prop_assert_eq!(records.len(), executed);
            for task in &tasks[executed..] {
                prop_assert_eq!(task.invocations(), 0);
            }
        }

        #[test]
        fn prop_dispatcher_never_exceeds_concurrency_limit(
            item_count in 1usize..40,
            batch_size in 1usize..8,
            limit in 1usize..5,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();
            let provider = Arc::new(ConcurrencyProbeProvider::new(Duration::from_millis(5)));
            let dispatcher = EmbeddingDispatcher::new(
                provider.clone(),
                DispatchSettings {
                    concurrency_limit: limit,
                    batch_size,
                    inter_batch_delay: Duration::ZERO,
                    ..DispatchSettings::default()
                },
                quick_retry(2),
            );
            let requests: Vec<EmbeddingRequest> = (0..item_count)
                .map(|i| EmbeddingRequest::new(format!("r{}", i), format!("text {}", i)))
                .collect();

            let results = rt.block_on(dispatcher.submit(requests));

            prop_assert_eq!(results.len(), item_count);
            for (i, result) in results.iter().enumerate() {
                prop_assert_eq!(&result.item_id, &format!("r{}", i));
                prop_assert!(result.is_embedded());
            }
            prop_assert!(provider.max_in_flight() <= limit);
            prop_assert_eq!(provider.calls(), item_count.div_ceil(batch_size));
            prop_assert!(provider.batch_sizes().iter().all(|size| *size <= batch_size));
        }
    }
}
