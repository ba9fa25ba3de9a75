// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{Classify, ErrorClass, TaskError};
use crate::engine::run::{RunId, RunStatus};
use crate::model::BackendKind;
use thiserror::Error;

/// Failures that end (or refuse to start) a pipeline run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("storage backend(s) unreachable at health check: {}", join_backends(.backends))]
    BackendUnreachable { backends: Vec<BackendKind> },

    #[error("task '{task}' failed after {attempts} attempt(s): {source}")]
    TaskFailed {
        task: String,
        attempts: u32,
        #[source]
        source: TaskError,
    },

    #[error(
        "partial-failure threshold {threshold} exceeded: {failed_batches} of {total_batches} write batches failed{}",
        pervasive_suffix(.pervasive_backend)
    )]
    PartialFailureThresholdExceeded {
        failed_batches: usize,
        total_batches: usize,
        threshold: f64,
        pervasive_backend: Option<BackendKind>,
    },

    #[error("pipeline run {0} not found")]
    RunNotFound(RunId),

    #[error("illegal run transition {from:?} -> {to:?}")]
    InvalidTransition { from: RunStatus, to: RunStatus },
}

fn join_backends(backends: &[BackendKind]) -> String {
    backends
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn pervasive_suffix(backend: &Option<BackendKind>) -> String {
    match backend {
        Some(kind) => format!(" ({} backend failing pervasively)", kind),
        None => String::new(),
    }
}

impl Classify for PipelineError {
    fn class(&self) -> ErrorClass {
        match self {
            PipelineError::TaskFailed { source, .. } => source.class(),
            PipelineError::PartialFailureThresholdExceeded { .. } => ErrorClass::Data,
            PipelineError::BackendUnreachable { .. }
            | PipelineError::RunNotFound(_)
            | PipelineError::InvalidTransition { .. } => ErrorClass::Fatal,
        }
    }
}
