// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{Classify, ErrorClass, ProviderError, StorageError};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single task invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The task's input as a whole is unusable; re-running cannot help.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A single work item could not be processed.
    #[error("invalid work item '{item_id}': {reason}")]
    InvalidWorkItem { item_id: String, reason: String },

    /// A transient failure inside the task itself.
    #[error("task failed: {0}")]
    Failed(String),

    /// An unrecoverable failure inside the task itself.
    #[error("task failed fatally: {0}")]
    Fatal(String),

    #[error("task panicked or was aborted: {0}")]
    Aborted(String),

    /// The provider calls behind this task already used up their own retries.
    #[error("provider retries exhausted: {0}")]
    Exhausted(ProviderError),
}

impl Classify for TaskError {
    fn class(&self) -> ErrorClass {
        match self {
            TaskError::Provider(err) | TaskError::Exhausted(err) => err.class(),
            TaskError::Storage(err) => err.class(),
            TaskError::InvalidWorkItem { .. } => ErrorClass::Data,
            TaskError::Failed(_) => ErrorClass::Transient,
            TaskError::MalformedInput(_) | TaskError::Fatal(_) | TaskError::Aborted(_) => {
                ErrorClass::Fatal
            }
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            TaskError::Provider(err) => err.retry_after(),
            _ => None,
        }
    }

    fn exhausted(&self) -> bool {
        matches!(self, TaskError::Exhausted(_))
    }
}
