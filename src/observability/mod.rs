// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! All diagnostic and operational log lines are built from message structs that
//! implement `Display` (the human-readable line) and
//! [`StructuredLog`](messages::StructuredLog) (the same event with typed fields).
//! Keeping the wording in one place removes magic strings from the engine code
//! and keeps field names consistent between subsystems.
//!
//! # Architecture
//!
//! * `messages::dispatch` - embedding dispatcher batches, retries and failures
//! * `messages::storage` - storage fan-out writes and backend health
//! * `messages::run` - pipeline run lifecycle and task execution
//! * `messages::validation` - configuration validation failures
//!
//! # Usage
//!
//! ```rust
//! use mnemo_pipeline::observability::messages::dispatch::DispatchStarted;
//! use mnemo_pipeline::observability::messages::StructuredLog;
//!
//! DispatchStarted {
//!     item_count: 12,
//!     batch_count: 3,
//!     concurrency_limit: 2,
//! }
//! .log();
//! ```

pub mod messages;
