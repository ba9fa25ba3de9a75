// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error types and the failure taxonomy shared by every retrying component.
//!
//! Every error the pipeline can observe is sorted into one of three classes:
//!
//! * [`ErrorClass::Transient`] - timeouts, rate limits, temporary unavailability.
//!   Retried under the [`RetryPolicy`](crate::resilience::RetryPolicy).
//! * [`ErrorClass::Data`] - empty vectors, malformed work items. Retried a bounded
//!   number of times, then recorded as an item-level failure.
//! * [`ErrorClass::Fatal`] - authentication failures, configuration errors,
//!   unreachable backends. Never retried; aborts the owning unit immediately.

mod config;
mod pipeline;
mod provider;
mod storage;
mod task;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use config::{ConfigError, ValidationError};
pub use pipeline::PipelineError;
pub use provider::ProviderError;
pub use storage::StorageError;
pub use task::TaskError;

/// Failure class used to decide retry eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Data,
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::Fatal)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Data => "data",
            ErrorClass::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

/// Implemented by every error that flows through a retry loop.
pub trait Classify {
    fn class(&self) -> ErrorClass;

    /// Delay suggested by the remote side, if it supplied one.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// The work behind this error was already retried to its limit further down.
    fn exhausted(&self) -> bool {
        false
    }
}
