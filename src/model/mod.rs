// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Data that flows through a pipeline run: work items, embedding requests and
//! results, and the storage write batches handed to the fan-out coordinator.

mod batch;
mod embedding;
mod work_item;

pub use batch::{
    BackendKind, GraphEdge, GraphNode, ItemWriteResult, MetadataRow, StorageRecord,
    StorageWriteBatch, VectorEntry,
};
pub use embedding::{is_valid_vector, EmbeddingRequest, EmbeddingResult, EmbeddingStatus};
pub use work_item::{TaskData, WorkContent, WorkItem};
