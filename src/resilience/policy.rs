// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS,
};
use crate::errors::Classify;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Exponential backoff policy with a failure classification gate.
///
/// `max_attempts` counts the first attempt, so `max_attempts = 3` means one call
/// plus at most two retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp(GiveUpReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The failure is classified fatal.
    Fatal,
    /// `max_attempts` has been reached.
    Exhausted,
    /// Cancellation was observed between attempts.
    Cancelled,
}

/// Result of [`RetryPolicy::run`].
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
    /// Errors of every failed attempt, oldest first.
    pub errors: Vec<E>,
    pub gave_up: Option<GiveUpReason>,
}

impl RetryPolicy {
    /// A policy that never retries and never sleeps.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after attempt number `attempt` (1-based) has failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let scaled = self.base_delay.as_nanos() as f64 * factor;
        if !scaled.is_finite() || scaled >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(scaled as u64)
    }

    /// Decides whether attempt number `attempt` (1-based), which failed with `error`,
    /// should be followed by another attempt.
    pub fn decide<E: Classify>(&self, error: &E, attempt: u32) -> RetryDecision {
        if !error.class().is_retryable() {
            return RetryDecision::GiveUp(GiveUpReason::Fatal);
        }
        if error.exhausted() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp(GiveUpReason::Exhausted);
        }
        let delay = match error.retry_after() {
            Some(suggested) => suggested.min(self.max_delay),
            None => self.delay_for_attempt(attempt),
        };
        RetryDecision::Retry { delay }
    }

    /// Runs `op` until it succeeds, fails fatally, runs out of attempts, or `cancel`
    /// fires between attempts. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: Option<&CancellationToken>,
        mut op: F,
    ) -> RetryOutcome<T, E>
    where
        E: Classify,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut errors = Vec::new();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        errors,
                        gave_up: None,
                    }
                }
                Err(err) => {
                    let decision = self.decide(&err, attempt);
                    let reason = match decision {
                        RetryDecision::GiveUp(reason) => Some(reason),
                        RetryDecision::Retry { .. }
                            if cancel.is_some_and(|c| c.is_cancelled()) =>
                        {
                            Some(GiveUpReason::Cancelled)
                        }
                        RetryDecision::Retry { .. } => None,
                    };
                    if let Some(reason) = reason {
                        return RetryOutcome {
                            result: Err(err),
                            attempts: attempt,
                            errors,
                            gave_up: Some(reason),
                        };
                    }
                    if let RetryDecision::Retry { delay } = decision {
                        tracing::debug!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            class = %err.class(),
                            "retrying after failed attempt"
                        );
                        errors.push(err);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }
    }
}
