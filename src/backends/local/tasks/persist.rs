// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;

use crate::engine::context::RunContext;
use crate::errors::TaskError;
use crate::model::{
    GraphEdge, GraphNode, MetadataRow, StorageWriteBatch, TaskData, VectorEntry, WorkContent,
    WorkItem,
};
use crate::traits::{Task, TaskOutput};

pub const DEFAULT_COLLECTION: &str = "chunks";
pub const DEFAULT_TABLE: &str = "chunks";

/// Writes its input items to the graph, vector and relational backends as one
/// write batch per invocation.
///
/// Every item gets a metadata row; items with a vector get a vector entry; graph
/// items contribute their nodes and edges, deduplicated within the batch. The
/// output is a JSON summary of the batch's per-backend outcome. Backend failures
/// do not fail the invocation: they are recorded against the run and judged by
/// the partial-failure threshold.
pub struct PersistTask {
    name: String,
    collection: String,
    table: String,
}

impl PersistTask {
    pub fn new(
        name: impl Into<String>,
        collection: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            table: table.into(),
        }
    }

    fn build_batch(&self, batch_id: String, items: &[WorkItem]) -> StorageWriteBatch {
        let mut batch = StorageWriteBatch::new(batch_id);
        let mut node_ids = HashSet::new();
        let mut edge_ids = HashSet::new();

        for item in items {
            let no_nodes: &[GraphNode] = &[];
            let no_edges: &[GraphEdge] = &[];
            let (vector, nodes, edges) = match &item.content {
                WorkContent::Text { .. } => (None, no_nodes, no_edges),
                WorkContent::Embedded { vector, .. } => (Some(vector), no_nodes, no_edges),
                WorkContent::Graph {
                    nodes,
                    edges,
                    vector,
                    ..
                } => (vector.as_ref(), nodes.as_slice(), edges.as_slice()),
            };

            for node in nodes {
                if node_ids.insert(node.id.clone()) {
                    batch.nodes.push(node.clone());
                }
            }
            for edge in edges {
                if edge_ids.insert(edge.id()) {
                    batch.edges.push(edge.clone());
                }
            }
            if let Some(vector) = vector {
                batch.vectors.push(VectorEntry {
                    id: item.id.clone(),
                    collection: self.collection.clone(),
                    vector: vector.clone(),
                    text: item.text_content().to_string(),
                });
            }
            batch.metadata.push(MetadataRow {
                id: item.id.clone(),
                table: self.table.clone(),
                correlation_id: item.correlation_id.clone(),
                fields: json!({
                    "text": item.text_content(),
                    "embedded": vector.is_some(),
                    "entities": nodes.len(),
                }),
            });
        }
        batch
    }
}

impl Default for PersistTask {
    fn default() -> Self {
        Self::new("persist", DEFAULT_COLLECTION, DEFAULT_TABLE)
    }
}

#[async_trait]
impl Task for PersistTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn batch_compatible(&self) -> bool {
        true
    }

    async fn execute(&self, input: TaskData, ctx: &RunContext) -> Result<TaskOutput, TaskError> {
        let items = input
            .into_items()
            .ok_or_else(|| TaskError::MalformedInput("persist expects work items".into()))?;
        let Some(first) = items.first() else {
            return Ok(TaskOutput::Value(json!({ "batch_id": null, "records": 0 })));
        };

        // Stable per partition, so a re-invocation rewrites the same records.
        let batch_id = format!("{}:{}", ctx.run_id(), first.id);
        let batch = self.build_batch(batch_id, &items);
        let records = batch.record_count();
        let outcome = ctx.store(batch).await;

        Ok(TaskOutput::Value(json!({
            "batch_id": outcome.batch_id,
            "records": records,
            "written": outcome.written(),
            "failed": outcome.failed(),
            "failed_backends": outcome
                .failed_backends()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
        })))
    }
}
