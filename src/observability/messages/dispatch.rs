// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the embedding dispatcher.
//!
//! This module contains message types for logging events related to:
//! * Splitting a submission into batches
//! * Batch retries and exhausted batches
//! * Submission completion

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A submission was split into batches and handed to the worker pool.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use mnemo_pipeline::observability::messages::dispatch::DispatchStarted;
///
/// let msg = DispatchStarted {
///     item_count: 12,
///     batch_count: 3,
///     concurrency_limit: 2,
/// };
///
/// assert_eq!(
///     msg.to_string(),
///     "Dispatching 12 embedding requests in 3 batches, concurrency_limit=2"
/// );
/// ```
pub struct DispatchStarted {
    pub item_count: usize,
    pub batch_count: usize,
    pub concurrency_limit: usize,
}

impl Display for DispatchStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatching {} embedding requests in {} batches, concurrency_limit={}",
            self.item_count, self.batch_count, self.concurrency_limit
        )
    }
}

impl StructuredLog for DispatchStarted {
    fn log(&self) {
        tracing::info!(
            item_count = self.item_count,
            batch_count = self.batch_count,
            concurrency_limit = self.concurrency_limit,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "embedding_dispatch",
            span_name = name,
            item_count = self.item_count,
            batch_count = self.batch_count,
            concurrency_limit = self.concurrency_limit,
        )
    }
}

/// A batch call failed and will be retried.
///
/// # Log Level
/// `warn!` - Recoverable problem
pub struct BatchRetrying<'a> {
    pub batch_index: usize,
    pub attempt: u32,
    pub error: &'a dyn std::error::Error,
}

impl Display for BatchRetrying<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Embedding batch {} failed on attempt {}, retrying: {}",
            self.batch_index, self.attempt, self.error
        )
    }
}

impl StructuredLog for BatchRetrying<'_> {
    fn log(&self) {
        tracing::warn!(
            batch_index = self.batch_index,
            attempt = self.attempt,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "embedding_batch_retry",
            span_name = name,
            batch_index = self.batch_index,
            attempt = self.attempt,
        )
    }
}

/// A batch exhausted its attempts; every item in it is marked failed.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct BatchFailed<'a> {
    pub batch_index: usize,
    pub item_count: usize,
    pub attempts: u32,
    pub error: &'a dyn std::error::Error,
}

impl Display for BatchFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Embedding batch {} ({} items) failed after {} attempt(s): {}",
            self.batch_index, self.item_count, self.attempts, self.error
        )
    }
}

impl StructuredLog for BatchFailed<'_> {
    fn log(&self) {
        tracing::error!(
            batch_index = self.batch_index,
            item_count = self.item_count,
            attempts = self.attempts,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "embedding_batch_failed",
            span_name = name,
            batch_index = self.batch_index,
            item_count = self.item_count,
            attempts = self.attempts,
        )
    }
}

/// All batches of a submission resolved.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use mnemo_pipeline::observability::messages::dispatch::DispatchCompleted;
/// use std::time::Duration;
///
/// let msg = DispatchCompleted {
///     item_count: 12,
///     failed_count: 5,
///     duration: Duration::from_millis(40),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct DispatchCompleted {
    pub item_count: usize,
    pub failed_count: usize,
    pub duration: Duration,
}

impl Display for DispatchCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Embedding dispatch completed: {} items, {} failed, in {:?}",
            self.item_count, self.failed_count, self.duration
        )
    }
}

impl StructuredLog for DispatchCompleted {
    fn log(&self) {
        tracing::info!(
            item_count = self.item_count,
            failed_count = self.failed_count,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "embedding_dispatch_completed",
            span_name = name,
            item_count = self.item_count,
            failed_count = self.failed_count,
            duration = ?self.duration,
        )
    }
}
