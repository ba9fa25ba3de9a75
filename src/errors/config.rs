// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use thiserror::Error;

/// Problems found while validating a pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A limit or size that must be at least one was zero
    ZeroLimit {
        /// The offending option name
        option: &'static str,
    },
    /// The backoff multiplier would shrink delays between attempts
    InvalidBackoffMultiplier { multiplier: f64 },
    /// The base delay is larger than the delay cap
    BaseDelayExceedsMaxDelay { base_delay_ms: u64, max_delay_ms: u64 },
    /// The partial-failure threshold is not a fraction
    ThresholdOutOfRange { threshold: f64 },
    /// Two pipeline tasks share a name
    DuplicateTaskName { name: String },
    /// A pipeline task refers to an implementation that does not exist
    UnknownTaskKind { name: String, kind: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroLimit { option } => {
                write!(f, "Option '{}' must be at least 1", option)
            }
            ValidationError::InvalidBackoffMultiplier { multiplier } => {
                write!(
                    f,
                    "backoff_multiplier must be >= 1.0 and finite, got {}",
                    multiplier
                )
            }
            ValidationError::BaseDelayExceedsMaxDelay {
                base_delay_ms,
                max_delay_ms,
            } => {
                write!(
                    f,
                    "base_delay_ms ({}) must not exceed max_delay_ms ({})",
                    base_delay_ms, max_delay_ms
                )
            }
            ValidationError::ThresholdOutOfRange { threshold } => {
                write!(
                    f,
                    "partial_failure_threshold must be within [0, 1], got {}",
                    threshold
                )
            }
            ValidationError::DuplicateTaskName { name } => {
                write!(f, "Duplicate task name: '{}'", name)
            }
            ValidationError::UnknownTaskKind { name, kind } => {
                write!(f, "Task '{}' uses unknown task kind '{}'", name, kind)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Failures while loading configuration or building a runtime from it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported config file extension '{0}' (expected yaml, yml or toml)")]
    UnsupportedFormat(String),

    #[error("Configuration validation failed:\n{}", join_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error("failed to build task '{task}': {reason}")]
    TaskBuild { task: String, reason: String },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
