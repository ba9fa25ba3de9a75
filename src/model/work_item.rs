// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::batch::{GraphEdge, GraphNode};
use crate::engine::run::RunId;
use serde::{Deserialize, Serialize};

/// A unit of data passed between tasks or submitted for embedding and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    /// Id of the original input this item was derived from.
    pub correlation_id: String,
    pub run_id: Option<RunId>,
    pub content: WorkContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkContent {
    Text {
        text: String,
    },
    Embedded {
        text: String,
        vector: Vec<f32>,
    },
    /// Text with extracted entities and relationships, embedded once a vector is set.
    Graph {
        text: String,
        nodes: Vec<GraphNode>,
        edges: Vec<GraphEdge>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vector: Option<Vec<f32>>,
    },
}

impl WorkItem {
    pub fn text(
        id: impl Into<String>,
        correlation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            correlation_id: correlation_id.into(),
            run_id: None,
            content: WorkContent::Text { text: text.into() },
        }
    }

    pub fn with_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Derives a child item that keeps this item's correlation and run ids.
    pub fn derive(&self, id: impl Into<String>, content: WorkContent) -> Self {
        Self {
            id: id.into(),
            correlation_id: self.correlation_id.clone(),
            run_id: self.run_id,
            content,
        }
    }

    pub fn text_content(&self) -> &str {
        match &self.content {
            WorkContent::Text { text }
            | WorkContent::Embedded { text, .. }
            | WorkContent::Graph { text, .. } => text,
        }
    }
}

/// What a task receives as input and produces as output.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskData {
    Value(serde_json::Value),
    Items(Vec<WorkItem>),
}

impl TaskData {
    pub fn len(&self) -> usize {
        match self {
            TaskData::Value(_) => 1,
            TaskData::Items(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, TaskData::Items(items) if items.is_empty())
    }

    pub fn into_items(self) -> Option<Vec<WorkItem>> {
        match self {
            TaskData::Items(items) => Some(items),
            TaskData::Value(_) => None,
        }
    }
}
