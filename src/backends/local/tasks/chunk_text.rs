// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::Value;

use crate::config::consts::DEFAULT_CHUNK_WORDS;
use crate::engine::context::RunContext;
use crate::errors::TaskError;
use crate::model::{TaskData, WorkContent, WorkItem};
use crate::traits::{Task, TaskOutput};

/// Splits documents into chunks of at most `chunk_words` words.
///
/// Accepts text items, a single string, or an array of strings or
/// `{"id": .., "text": ..}` objects. Chunk ids are `<document id>#<n>`; every
/// chunk keeps its document's correlation id. Blank documents yield no chunks.
pub struct ChunkTextTask {
    name: String,
    chunk_words: usize,
}

impl ChunkTextTask {
    pub fn new(name: impl Into<String>, chunk_words: usize) -> Self {
        Self {
            name: name.into(),
            chunk_words: chunk_words.max(1),
        }
    }

    fn chunk(&self, document: &WorkItem) -> Vec<WorkItem> {
        let words: Vec<&str> = document.text_content().split_whitespace().collect();
        words
            .chunks(self.chunk_words)
            .enumerate()
            .map(|(n, chunk)| {
                document.derive(
                    format!("{}#{}", document.id, n),
                    WorkContent::Text {
                        text: chunk.join(" "),
                    },
                )
            })
            .collect()
    }
}

impl Default for ChunkTextTask {
    fn default() -> Self {
        Self::new("chunk_text", DEFAULT_CHUNK_WORDS)
    }
}

/// Turns raw task input into document items.
fn documents(input: TaskData) -> Result<Vec<WorkItem>, TaskError> {
    match input {
        TaskData::Items(items) => Ok(items),
        TaskData::Value(Value::String(text)) => Ok(vec![WorkItem::text("doc-1", "doc-1", text)]),
        TaskData::Value(Value::Array(values)) => values
            .into_iter()
            .enumerate()
            .map(|(i, value)| document_from_value(i, value))
            .collect(),
        TaskData::Value(other) => Err(TaskError::MalformedInput(format!(
            "expected text documents, got {}",
            other
        ))),
    }
}

fn document_from_value(index: usize, value: Value) -> Result<WorkItem, TaskError> {
    let default_id = format!("doc-{}", index + 1);
    match value {
        Value::String(text) => Ok(WorkItem::text(default_id.clone(), default_id, text)),
        Value::Object(map) => {
            let text = map
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    TaskError::MalformedInput(format!("document {} has no 'text' field", index))
                })?;
            let id = map
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(default_id);
            Ok(WorkItem::text(id.clone(), id, text))
        }
        other => Err(TaskError::MalformedInput(format!(
            "document {} is neither a string nor an object: {}",
            index, other
        ))),
    }
}

#[async_trait]
impl Task for ChunkTextTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn batch_compatible(&self) -> bool {
        true
    }

    async fn execute(&self, input: TaskData, ctx: &RunContext) -> Result<TaskOutput, TaskError> {
        let run_id = ctx.run_id();
        let chunks: Vec<WorkItem> = documents(input)?
            .into_iter()
            .map(|doc| match doc.run_id {
                Some(_) => doc,
                None => doc.with_run(run_id),
            })
            .flat_map(|doc| self.chunk(&doc))
            .collect();
        tracing::debug!(task = %self.name, chunks = chunks.len(), "chunked documents");
        Ok(TaskOutput::items(chunks))
    }
}
