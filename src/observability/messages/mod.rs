// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging, organized by subsystem.
//!
//! * `dispatch` - embedding dispatcher events
//! * `storage` - storage fan-out events
//! * `run` - pipeline run and task lifecycle events
//! * `validation` - configuration validation errors

use tracing::Span;

pub mod dispatch;
pub mod run;
pub mod storage;
pub mod validation;

/// A log message that can emit itself as a structured event or open a span
/// carrying the same fields.
pub trait StructuredLog {
    /// Emit the message at its documented level with structured fields.
    fn log(&self);

    /// Create a span carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}
