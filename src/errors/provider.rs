// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{Classify, ErrorClass};
use std::time::Duration;
use thiserror::Error;

/// Failures reported by (or on behalf of) an embedding provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("embedding provider call timed out after {0:?}")]
    ProviderTimeout(Duration),

    #[error("embedding provider returned an empty or non-finite vector")]
    EmptyVectorReturned,

    #[error("embedding provider rate limited the request{}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("embedding provider rejected credentials: {0}")]
    AuthenticationFailure(String),

    #[error("embedding provider returned {received} vectors for a batch of {expected}")]
    MalformedResponse { expected: usize, received: usize },

    #[error("embedding request cancelled before dispatch")]
    Cancelled,
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(" (retry after {:?})", delay),
        None => String::new(),
    }
}

impl Classify for ProviderError {
    fn class(&self) -> ErrorClass {
        match self {
            ProviderError::ProviderUnavailable(_)
            | ProviderError::ProviderTimeout(_)
            | ProviderError::RateLimited { .. } => ErrorClass::Transient,
            ProviderError::EmptyVectorReturned | ProviderError::MalformedResponse { .. } => {
                ErrorClass::Data
            }
            ProviderError::AuthenticationFailure(_) | ProviderError::Cancelled => {
                ErrorClass::Fatal
            }
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
