// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::*;
use crate::engine::dispatcher::DispatchSettings;
use crate::engine::fanout::FanoutSettings;
use crate::engine::orchestrator::OrchestratorSettings;
use crate::errors::ConfigError;
use crate::resilience::RetryPolicy;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Complete configuration for a pipeline runtime.
///
/// Every option has a built-in default, so an empty document is a valid config.
/// Durations are given in milliseconds; `base_delay` and `max_delay` are accepted
/// as aliases of their `_ms` keys.
///
/// # Example
/// ```yaml
/// name: notes
/// embedding_concurrency_limit: 4
/// embedding_batch_size: 16
/// inter_batch_delay_ms: 100
/// task_parallel_concurrency_limit: 4
/// max_attempts: 3
/// base_delay_ms: 200
/// backoff_multiplier: 2.0
/// max_delay_ms: 10000
/// partial_failure_threshold: 0.5
/// provider:
///   kind: hashing
///   dimensions: 64
/// tasks:
///   - name: chunk
///     kind: chunk_text
///     options:
///       chunk_words: 48
///   - name: embed
///     kind: embed_chunks
///   - name: persist
///     kind: persist
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name: String,

    pub embedding_concurrency_limit: usize,
    pub embedding_batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub embedding_call_timeout_ms: u64,

    pub task_parallel_concurrency_limit: usize,
    pub task_partition_size: usize,

    pub max_attempts: u32,
    #[serde(alias = "base_delay")]
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    #[serde(alias = "max_delay")]
    pub max_delay_ms: u64,

    pub partial_failure_threshold: f64,
    pub storage_write_timeout_ms: u64,

    pub run_retention_secs: u64,

    pub provider: ProviderConfig,
    pub storage: StorageConfig,
    pub tasks: Vec<TaskConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_PIPELINE_NAME.to_string(),
            embedding_concurrency_limit: DEFAULT_EMBEDDING_CONCURRENCY_LIMIT,
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            inter_batch_delay_ms: DEFAULT_INTER_BATCH_DELAY_MS,
            embedding_call_timeout_ms: DEFAULT_EMBEDDING_CALL_TIMEOUT_MS,
            task_parallel_concurrency_limit: DEFAULT_TASK_PARALLEL_CONCURRENCY_LIMIT,
            task_partition_size: DEFAULT_TASK_PARTITION_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            partial_failure_threshold: DEFAULT_PARTIAL_FAILURE_THRESHOLD,
            storage_write_timeout_ms: DEFAULT_STORAGE_WRITE_TIMEOUT_MS,
            run_retention_secs: DEFAULT_RUN_RETENTION_SECS,
            provider: ProviderConfig::default(),
            storage: StorageConfig::default(),
            tasks: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            concurrency_limit: self.embedding_concurrency_limit,
            batch_size: self.embedding_batch_size,
            inter_batch_delay: Duration::from_millis(self.inter_batch_delay_ms),
            call_timeout: Duration::from_millis(self.embedding_call_timeout_ms),
        }
    }

    pub fn fanout_settings(&self) -> FanoutSettings {
        FanoutSettings {
            write_timeout: Duration::from_millis(self.storage_write_timeout_ms),
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            task_parallel_concurrency_limit: self.task_parallel_concurrency_limit,
            task_partition_size: self.task_partition_size,
            partial_failure_threshold: self.partial_failure_threshold,
            run_retention: Duration::from_secs(self.run_retention_secs),
        }
    }
}

/// Embedding provider selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub dimensions: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Hashing,
            dimensions: DEFAULT_HASHING_DIMENSIONS,
        }
    }
}

/// Embedding provider implementations available to a config file.
///
/// # Variants
/// * `Hashing` - Deterministic in-process feature hashing, no network
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Hashing,
}

/// Storage implementation for each of the three backends.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub graph: StoreKind,
    pub vector: StoreKind,
    pub relational: StoreKind,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            graph: StoreKind::Memory,
            vector: StoreKind::Memory,
            relational: StoreKind::Memory,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Memory,
}

/// One step of the pipeline.
///
/// # Example
/// ```yaml
/// name: "extract"
/// kind: extract_graph
/// options:
///   min_entity_len: 3
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
}

/// Parse a config document, picking the format from `extension`.
pub fn parse_config_str(content: &str, extension: &str) -> Result<PipelineConfig, ConfigError> {
    match extension {
        "yaml" | "yml" => Ok(serde_yaml::from_str(content)?),
        "toml" => Ok(toml::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Load a config from a YAML or TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, ConfigError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let content = fs::read_to_string(path)?;
    parse_config_str(&content, &extension)
}

/// Load a config and reject it if any option is out of range.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, ConfigError> {
    let cfg = load_config(path)?;
    crate::config::validate_config(&cfg).map_err(ConfigError::Invalid)?;
    Ok(cfg)
}
