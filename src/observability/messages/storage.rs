// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for storage fan-out writes and backend health.

use crate::model::BackendKind;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A backend write gave up; the coordinator continues with the next backend.
///
/// # Log Level
/// `warn!` - Partial failure, accounted for in the write outcome
pub struct BackendWriteFailed<'a> {
    pub batch_id: &'a str,
    pub backend: BackendKind,
    pub attempts: u32,
    pub failed_records: usize,
    pub error: &'a dyn std::error::Error,
}

impl Display for BackendWriteFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Write of batch '{}' to {} backend failed after {} attempt(s), {} record(s) unwritten: {}",
            self.batch_id, self.backend, self.attempts, self.failed_records, self.error
        )
    }
}

impl StructuredLog for BackendWriteFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            batch_id = self.batch_id,
            backend = %self.backend,
            attempts = self.attempts,
            failed_records = self.failed_records,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "backend_write_failed",
            span_name = name,
            batch_id = self.batch_id,
            backend = %self.backend,
        )
    }
}

/// All three backends were attempted for a batch.
///
/// # Log Level
/// `debug!` - Routine per-batch event
pub struct FanoutCompleted<'a> {
    pub batch_id: &'a str,
    pub written: usize,
    pub failed: usize,
}

impl Display for FanoutCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fan-out of batch '{}' completed: {} written, {} failed",
            self.batch_id, self.written, self.failed
        )
    }
}

impl StructuredLog for FanoutCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            batch_id = self.batch_id,
            written = self.written,
            failed = self.failed,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "fanout",
            span_name = name,
            batch_id = self.batch_id,
            written = self.written,
            failed = self.failed,
        )
    }
}

/// A backend reported itself unreachable during a health check.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use mnemo_pipeline::model::BackendKind;
/// use mnemo_pipeline::observability::messages::storage::BackendUnreachable;
///
/// let msg = BackendUnreachable {
///     backend: BackendKind::Vector,
///     reason: "connection refused",
/// };
///
/// assert_eq!(msg.to_string(), "vector backend unreachable: connection refused");
/// ```
pub struct BackendUnreachable<'a> {
    pub backend: BackendKind,
    pub reason: &'a str,
}

impl Display for BackendUnreachable<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{} backend unreachable: {}", self.backend, self.reason)
    }
}

impl StructuredLog for BackendUnreachable<'_> {
    fn log(&self) {
        tracing::error!(
            backend = %self.backend,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "backend_unreachable",
            span_name = name,
            backend = %self.backend,
            reason = self.reason,
        )
    }
}
