// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use super::tasks::extract_graph::{DEFAULT_MIN_ENTITY_LEN, DEFAULT_RELATIONSHIP};
use super::tasks::persist::{DEFAULT_COLLECTION, DEFAULT_TABLE};
use super::tasks::*;
use crate::config::consts::DEFAULT_CHUNK_WORDS;
use crate::config::TaskConfig;
use crate::traits::Task;

/// Factory for the built-in, in-process tasks
pub struct LocalTaskFactory;

impl LocalTaskFactory {
    /// Create a task instance from configuration
    ///
    /// The `kind` field in the config determines which task to create:
    /// - "chunk_text" -> ChunkTextTask (option `chunk_words`)
    /// - "extract_graph" -> ExtractGraphTask (options `min_entity_len`, `relationship`)
    /// - "embed_chunks" -> EmbedChunksTask
    /// - "persist" -> PersistTask (options `collection`, `table`)
    pub fn create_task(config: &TaskConfig) -> Result<Arc<dyn Task>, String> {
        let name = config.name.clone();
        match config.kind.as_str() {
            "chunk_text" => Ok(Arc::new(ChunkTextTask::new(
                name,
                usize_option(config, "chunk_words", DEFAULT_CHUNK_WORDS)?,
            ))),
            "extract_graph" => Ok(Arc::new(ExtractGraphTask::new(
                name,
                usize_option(config, "min_entity_len", DEFAULT_MIN_ENTITY_LEN)?,
                str_option(config, "relationship", DEFAULT_RELATIONSHIP)?,
            ))),
            "embed_chunks" => Ok(Arc::new(EmbedChunksTask::new(name))),
            "persist" => Ok(Arc::new(PersistTask::new(
                name,
                str_option(config, "collection", DEFAULT_COLLECTION)?,
                str_option(config, "table", DEFAULT_TABLE)?,
            ))),
            other => Err(format!("Unknown local task kind: '{}'", other)),
        }
    }

    /// List all available local task kinds
    pub fn list_available_implementations() -> Vec<&'static str> {
        vec!["chunk_text", "extract_graph", "embed_chunks", "persist"]
    }

    /// Check if a task kind is available
    pub fn is_implementation_available(kind: &str) -> bool {
        Self::list_available_implementations().contains(&kind)
    }
}

fn usize_option(config: &TaskConfig, key: &str, default: usize) -> Result<usize, String> {
    match config.options.get(key) {
        None => Ok(default),
        Some(value) => value
            .as_u64()
            .filter(|v| *v > 0)
            .map(|v| v as usize)
            .ok_or_else(|| {
                format!(
                    "Task '{}' option '{}' must be a positive integer, got {}",
                    config.name, key, value
                )
            }),
    }
}

fn str_option(config: &TaskConfig, key: &str, default: &str) -> Result<String, String> {
    match config.options.get(key) {
        None => Ok(default.to_string()),
        Some(value) => value.as_str().map(str::to_string).ok_or_else(|| {
            format!(
                "Task '{}' option '{}' must be a string, got {}",
                config.name, key, value
            )
        }),
    }
}
