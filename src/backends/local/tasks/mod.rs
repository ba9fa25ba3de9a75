// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod chunk_text;
pub mod embed_chunks;
pub mod extract_graph;
pub mod persist;

pub use chunk_text::ChunkTextTask;
pub use embed_chunks::EmbedChunksTask;
pub use extract_graph::ExtractGraphTask;
pub use persist::PersistTask;
