// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Built-in collaborators for the pipeline engine.
//!
//! # Available Backends
//!
//! ## Local Tasks
//! In-process pipeline steps resolved by kind through [`local::LocalTaskFactory`]:
//! - **chunk_text**: split documents into word chunks
//! - **extract_graph**: entity and relationship extraction, parallel-safe
//! - **embed_chunks**: embed chunk text through the shared dispatcher
//! - **persist**: fan chunk records out to the graph, vector and relational stores
//!
//! ## Hashing Provider
//! Deterministic feature-hashing embeddings, no network access needed.
//!
//! ## Memory Stores
//! In-memory graph, vector and relational stores with failure injection.
//!
//! ## Stub Backend (Test-Only)
//! Scripted providers and tasks for engine tests (only available in test builds).
//!
//! # Examples
//!
//! ```rust
//! use mnemo_pipeline::backends::local::LocalTaskFactory;
//! use mnemo_pipeline::config::TaskConfig;
//! use std::collections::HashMap;
//!
//! let config = TaskConfig {
//!     name: "chunk".to_string(),
//!     kind: "chunk_text".to_string(),
//!     options: HashMap::new(),
//! };
//!
//! let task = LocalTaskFactory::create_task(&config)?;
//! assert_eq!(task.name(), "chunk");
//! # Ok::<(), String>(())
//! ```

pub mod hashing;
pub mod local;
pub mod memory;
#[cfg(test)]
pub mod stub;
