// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::run::RunId;
use crate::errors::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three independent storage systems a batch fans out to.
///
/// Declaration order is the write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Graph,
    Vector,
    Relational,
}

impl BackendKind {
    pub const WRITE_ORDER: [BackendKind; 3] =
        [BackendKind::Graph, BackendKind::Vector, BackendKind::Relational];
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BackendKind::Graph => "graph",
            BackendKind::Vector => "vector",
            BackendKind::Relational => "relational",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relationship: String,
}

impl GraphEdge {
    pub fn id(&self) -> String {
        format!("{}-[{}]->{}", self.source, self.relationship, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub collection: String,
    pub vector: Vec<f32>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    pub id: String,
    pub table: String,
    pub correlation_id: String,
    pub fields: serde_json::Value,
}

/// One record as seen by a single backend.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageRecord {
    Node(GraphNode),
    Edge(GraphEdge),
    Vector(VectorEntry),
    Metadata(MetadataRow),
}

impl StorageRecord {
    pub fn id(&self) -> String {
        match self {
            StorageRecord::Node(node) => node.id.clone(),
            StorageRecord::Edge(edge) => edge.id(),
            StorageRecord::Vector(entry) => entry.id.clone(),
            StorageRecord::Metadata(row) => row.id.clone(),
        }
    }
}

/// Per-record result returned by a backend write call.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemWriteResult {
    pub record_id: String,
    pub result: Result<(), StorageError>,
}

impl ItemWriteResult {
    pub fn ok(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            result: Ok(()),
        }
    }

    pub fn failed(record_id: impl Into<String>, error: StorageError) -> Self {
        Self {
            record_id: record_id.into(),
            result: Err(error),
        }
    }
}

/// Graph, vector and relational records produced by one task output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageWriteBatch {
    pub batch_id: String,
    pub run_id: Option<RunId>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub vectors: Vec<VectorEntry>,
    pub metadata: Vec<MetadataRow>,
}

impl StorageWriteBatch {
    pub fn new(batch_id: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            ..Default::default()
        }
    }

    /// Records destined for one backend, in the order they were added.
    pub fn records_for(&self, backend: BackendKind) -> Vec<StorageRecord> {
        match backend {
            BackendKind::Graph => self
                .nodes
                .iter()
                .cloned()
                .map(StorageRecord::Node)
                .chain(self.edges.iter().cloned().map(StorageRecord::Edge))
                .collect(),
            BackendKind::Vector => self
                .vectors
                .iter()
                .cloned()
                .map(StorageRecord::Vector)
                .collect(),
            BackendKind::Relational => self
                .metadata
                .iter()
                .cloned()
                .map(StorageRecord::Metadata)
                .collect(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.nodes.len() + self.edges.len() + self.vectors.len() + self.metadata.len()
    }
}
