// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for configuration validation errors.

use crate::errors::ValidationError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Configuration validation found one or more problems.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use mnemo_pipeline::errors::ValidationError;
/// use mnemo_pipeline::observability::messages::validation::ConfigValidationFailed;
///
/// let error = ValidationError::ZeroLimit { option: "embedding_batch_size" };
/// let msg = ConfigValidationFailed {
///     error_count: 2,
///     first_error: &error,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct ConfigValidationFailed<'a> {
    pub error_count: usize,
    pub first_error: &'a ValidationError,
}

impl Display for ConfigValidationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Configuration validation failed with {} error(s), first: {}",
            self.error_count, self.first_error
        )
    }
}

impl StructuredLog for ConfigValidationFailed<'_> {
    fn log(&self) {
        tracing::error!(
            error_count = self.error_count,
            first_error = %self.first_error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::ERROR,
            "config_validation_failed",
            name = name,
            error_count = self.error_count,
        )
    }
}
