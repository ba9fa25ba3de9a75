// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;

use crate::backends::hashing::HashingProvider;
use crate::backends::local::LocalTaskFactory;
use crate::backends::memory::MemoryStores;
use crate::config::{PipelineConfig, ProviderKind, StoreKind, TaskConfig};
use crate::engine::{
    EmbeddingDispatcher, Orchestrator, Pipeline, StorageBackends, StorageCoordinator,
};
use crate::errors::ConfigError;
use crate::model::BackendKind;
use crate::traits::{EmbeddingProvider, StorageBackend};

/// Everything needed to run a configured pipeline.
pub struct Runtime {
    pub orchestrator: Orchestrator,
    pub pipeline: Pipeline,
    /// The in-memory stores behind the storage backends, for inspection.
    pub stores: MemoryStores,
}

/// Pipeline runtime builder - resolves provider, storage and task kinds from
/// configuration into a ready orchestrator and pipeline.
///
/// Kinds are resolved once, here; nothing downstream looks at configuration
/// strings again. When the config lists no tasks the built-in chain
/// `chunk_text -> extract_graph -> embed_chunks -> persist` is used.
///
/// # Examples
///
/// ```
/// use mnemo_pipeline::config::{PipelineConfig, RuntimeBuilder};
///
/// let runtime = RuntimeBuilder::from_config(&PipelineConfig::default()).unwrap();
///
/// assert_eq!(
///     runtime.pipeline.task_names(),
///     vec!["chunk_text", "extract_graph", "embed_chunks", "persist"]
/// );
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Build a complete runtime from configuration.
    ///
    /// The configuration is expected to be validated already; option values a
    /// task cannot use are still reported as [`ConfigError::TaskBuild`].
    pub fn from_config(cfg: &PipelineConfig) -> Result<Runtime, ConfigError> {
        let provider: Arc<dyn EmbeddingProvider> = match cfg.provider.kind {
            ProviderKind::Hashing => Arc::new(HashingProvider::new(cfg.provider.dimensions)),
        };

        let stores = MemoryStores::new();
        let backends = StorageBackends::new(
            store_for(cfg.storage.graph, &stores, BackendKind::Graph),
            store_for(cfg.storage.vector, &stores, BackendKind::Vector),
            store_for(cfg.storage.relational, &stores, BackendKind::Relational),
        );

        let retry = cfg.retry_policy();
        let dispatcher =
            EmbeddingDispatcher::new(provider, cfg.dispatch_settings(), retry.clone());
        let storage = StorageCoordinator::new(backends, retry.clone(), cfg.fanout_settings());
        let orchestrator = Orchestrator::new(
            Arc::new(dispatcher),
            Arc::new(storage),
            retry,
            cfg.orchestrator_settings(),
        );

        let task_configs = if cfg.tasks.is_empty() {
            default_task_configs()
        } else {
            cfg.tasks.clone()
        };
        let mut pipeline = Pipeline::new(cfg.name.clone());
        for task_config in &task_configs {
            let task = LocalTaskFactory::create_task(task_config).map_err(|reason| {
                ConfigError::TaskBuild {
                    task: task_config.name.clone(),
                    reason,
                }
            })?;
            pipeline = pipeline.with_task(task);
        }

        Ok(Runtime {
            orchestrator,
            pipeline,
            stores,
        })
    }
}

fn store_for(
    kind: StoreKind,
    stores: &MemoryStores,
    backend: BackendKind,
) -> Arc<dyn StorageBackend> {
    match kind {
        StoreKind::Memory => stores.get(backend).clone() as Arc<dyn StorageBackend>,
    }
}

fn default_task_configs() -> Vec<TaskConfig> {
    ["chunk_text", "extract_graph", "embed_chunks", "persist"]
        .into_iter()
        .map(|kind| TaskConfig {
            name: kind.to_string(),
            kind: kind.to_string(),
            options: HashMap::new(),
        })
        .collect()
}
