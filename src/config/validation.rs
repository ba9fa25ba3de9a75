// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Configuration validation.
//!
//! All checks run and all failures are returned together, so a user fixing a
//! config file sees every problem at once:
//!
//! 1. **Limits**: concurrency limits, batch and partition sizes and `max_attempts` are >= 1
//! 2. **Backoff**: multiplier >= 1.0, base delay <= max delay
//! 3. **Threshold**: `partial_failure_threshold` lies in [0, 1]
//! 4. **Tasks**: names are unique and every `kind` names a built-in task

use crate::backends::local::LocalTaskFactory;
use crate::config::PipelineConfig;
use crate::errors::ValidationError;
use crate::observability::messages::validation::ConfigValidationFailed;
use crate::observability::messages::StructuredLog;
use std::collections::HashSet;

/// Validate a pipeline configuration.
///
/// # Returns
/// * `Ok(())` if the configuration is usable
/// * `Err(Vec<ValidationError>)` with every problem found
pub fn validate_config(config: &PipelineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let limits: [(&'static str, u64); 5] = [
        (
            "embedding_concurrency_limit",
            config.embedding_concurrency_limit as u64,
        ),
        ("embedding_batch_size", config.embedding_batch_size as u64),
        (
            "task_parallel_concurrency_limit",
            config.task_parallel_concurrency_limit as u64,
        ),
        ("task_partition_size", config.task_partition_size as u64),
        ("max_attempts", config.max_attempts as u64),
    ];
    for (option, value) in limits {
        if value == 0 {
            errors.push(ValidationError::ZeroLimit { option });
        }
    }

    if !config.backoff_multiplier.is_finite() || config.backoff_multiplier < 1.0 {
        errors.push(ValidationError::InvalidBackoffMultiplier {
            multiplier: config.backoff_multiplier,
        });
    }

    if config.base_delay_ms > config.max_delay_ms {
        errors.push(ValidationError::BaseDelayExceedsMaxDelay {
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        });
    }

    if !(0.0..=1.0).contains(&config.partial_failure_threshold) {
        errors.push(ValidationError::ThresholdOutOfRange {
            threshold: config.partial_failure_threshold,
        });
    }

    let mut seen = HashSet::new();
    for task in &config.tasks {
        if !seen.insert(task.name.as_str()) {
            errors.push(ValidationError::DuplicateTaskName {
                name: task.name.clone(),
            });
        }
        if !LocalTaskFactory::is_implementation_available(&task.kind) {
            errors.push(ValidationError::UnknownTaskKind {
                name: task.name.clone(),
                kind: task.kind.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        ConfigValidationFailed {
            error_count: errors.len(),
            first_error: &errors[0],
        }
        .log();
        Err(errors)
    }
}
