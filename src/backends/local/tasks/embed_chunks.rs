// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::engine::context::RunContext;
use crate::engine::run::ItemFailure;
use crate::errors::TaskError;
use crate::model::{EmbeddingRequest, EmbeddingStatus, TaskData, WorkContent, WorkItem};
use crate::traits::{Task, TaskOutput};

/// Embeds every item's text through the run's shared dispatcher.
///
/// Items whose embedding failed are dropped from the output and recorded as
/// item failures of the run. The invocation only fails when no item could be
/// embedded at all.
pub struct EmbedChunksTask {
    name: String,
}

impl EmbedChunksTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for EmbedChunksTask {
    fn default() -> Self {
        Self::new("embed_chunks")
    }
}

fn with_vector(item: WorkItem, vector: Vec<f32>) -> WorkItem {
    let content = match item.content.clone() {
        WorkContent::Text { text } | WorkContent::Embedded { text, .. } => {
            WorkContent::Embedded { text, vector }
        }
        WorkContent::Graph {
            text, nodes, edges, ..
        } => WorkContent::Graph {
            text,
            nodes,
            edges,
            vector: Some(vector),
        },
    };
    item.derive(item.id.clone(), content)
}

#[async_trait]
impl Task for EmbedChunksTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: TaskData, ctx: &RunContext) -> Result<TaskOutput, TaskError> {
        let items = input
            .into_items()
            .ok_or_else(|| TaskError::MalformedInput("embed_chunks expects work items".into()))?;
        if items.is_empty() {
            return Ok(TaskOutput::items(Vec::new()));
        }

        let requests = items
            .iter()
            .map(|item| EmbeddingRequest::new(item.id.clone(), item.text_content()))
            .collect();
        let results = ctx.embed(requests).await;

        let mut embedded = Vec::with_capacity(items.len());
        let mut failures = Vec::new();
        let mut first_error = None;
        for (item, result) in items.into_iter().zip(results) {
            match result.status {
                EmbeddingStatus::Embedded(vector) => embedded.push(with_vector(item, vector)),
                EmbeddingStatus::Failed(err) => {
                    failures.push(ItemFailure::new(item.id, &err));
                    first_error.get_or_insert(err);
                }
            }
        }

        if !failures.is_empty() {
            tracing::warn!(
                run_id = %ctx.run_id(),
                task = %self.name,
                dropped = failures.len(),
                embedded = embedded.len(),
                "dropped items whose embedding failed"
            );
        }
        // Every failed item already went through the dispatcher's retries.
        match (embedded.is_empty(), first_error) {
            (true, Some(err)) => Err(TaskError::Exhausted(err)),
            _ => {
                ctx.record_item_failures(failures);
                Ok(TaskOutput::items(embedded))
            }
        }
    }
}
