// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Test doubles for providers and tasks.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::backends::memory::MemoryStores;
use crate::engine::context::RunContext;
use crate::engine::dispatcher::{DispatchSettings, EmbeddingDispatcher};
use crate::engine::fanout::{FanoutSettings, StorageCoordinator};
use crate::engine::run::RunId;
use crate::errors::{ProviderError, TaskError};
use crate::model::TaskData;
use crate::resilience::RetryPolicy;
use crate::traits::{EmbeddingProvider, Task, TaskOutput};

/// Retry policy with short delays for tests.
pub fn quick_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(10),
        backoff_multiplier: 2.0,
        max_delay: Duration::from_millis(100),
    }
}

/// A run context wired to `provider` and the given in-memory stores. Embedding
/// runs one provider call at a time, two items per call.
pub fn test_context(provider: Arc<dyn EmbeddingProvider>, stores: &MemoryStores) -> RunContext {
    let dispatcher = EmbeddingDispatcher::new(
        provider,
        DispatchSettings {
            concurrency_limit: 1,
            batch_size: 2,
            inter_batch_delay: Duration::ZERO,
            ..DispatchSettings::default()
        },
        quick_retry(2),
    );
    let storage = StorageCoordinator::new(
        stores.backends(),
        quick_retry(2),
        FanoutSettings::default(),
    );
    RunContext::new(
        RunId::new(),
        Arc::new(dispatcher),
        Arc::new(storage),
        CancellationToken::new(),
    )
}

fn vectors_for(texts: &[String]) -> Vec<Result<Vec<f32>, ProviderError>> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| Ok(vec![1.0, text.len() as f32, i as f32]))
        .collect()
}

/// Tracks the high-water mark of concurrent calls.
#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }

    fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Decrements on drop, so calls abandoned by a timeout are counted out too.
struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Provider that sleeps for a fixed delay and records how calls overlapped.
pub struct ConcurrencyProbeProvider {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: InFlight,
    batch_sizes: Mutex<Vec<usize>>,
}

impl ConcurrencyProbeProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
            in_flight: InFlight::default(),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.in_flight.max()
    }

    /// Batch sizes in the order calls started.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for ConcurrencyProbeProvider {
    fn name(&self) -> &str {
        "concurrency-probe"
    }

    async fn embed(
        &self,
        texts: &[String],
    ) -> Result<Vec<Result<Vec<f32>, ProviderError>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().push(texts.len());
        let _guard = self.in_flight.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(vectors_for(texts))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedResponse {
    Ok,
    /// Every vector in the response is empty.
    EmptyVectors,
    /// Only the vector at this position is empty.
    EmptyAt(usize),
    Error(ProviderError),
}

/// Provider that answers calls from a script, then falls back to a fixed response.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ScriptedResponse>>,
    fallback: ScriptedResponse,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: Vec<ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: ScriptedResponse::Ok,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(response: ScriptedResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: response,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn embed(
        &self,
        texts: &[String],
    ) -> Result<Vec<Result<Vec<f32>, ProviderError>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match response {
            ScriptedResponse::Ok => Ok(vectors_for(texts)),
            ScriptedResponse::EmptyVectors => Ok(texts.iter().map(|_| Ok(Vec::new())).collect()),
            ScriptedResponse::EmptyAt(index) => {
                let mut vectors = vectors_for(texts);
                if let Some(slot) = vectors.get_mut(index) {
                    *slot = Ok(Vec::new());
                }
                Ok(vectors)
            }
            ScriptedResponse::Error(err) => Err(err),
        }
    }
}

/// Configurable task that passes its input through unchanged.
///
/// It can fail its first invocations, sleep, panic, and declares whatever
/// partitioning capabilities it was built with. Every invocation is counted and
/// the size of each input is kept.
pub struct StubTask {
    name: String,
    delay: Duration,
    fail_first: u32,
    failure: TaskError,
    panics: bool,
    parallel_safe: bool,
    batch_compatible: bool,
    invocations: AtomicU32,
    input_sizes: Mutex<Vec<usize>>,
    in_flight: InFlight,
}

impl StubTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            fail_first: 0,
            failure: TaskError::Failed("scripted failure".into()),
            panics: false,
            parallel_safe: false,
            batch_compatible: false,
            invocations: AtomicU32::new(0),
            input_sizes: Mutex::new(Vec::new()),
            in_flight: InFlight::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fails the first `count` invocations with `error`.
    pub fn failing_first(mut self, count: u32, error: TaskError) -> Self {
        self.fail_first = count;
        self.failure = error;
        self
    }

    pub fn always_failing(self, error: TaskError) -> Self {
        self.failing_first(u32::MAX, error)
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallel_safe = true;
        self
    }

    pub fn batched(mut self) -> Self {
        self.batch_compatible = true;
        self
    }

    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn input_sizes(&self) -> Vec<usize> {
        self.input_sizes.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.in_flight.max()
    }
}

#[async_trait]
impl Task for StubTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn parallel_safe(&self) -> bool {
        self.parallel_safe
    }

    fn batch_compatible(&self) -> bool {
        self.batch_compatible
    }

    async fn execute(&self, input: TaskData, _ctx: &RunContext) -> Result<TaskOutput, TaskError> {
        let invocation = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        self.input_sizes.lock().push(input.len());
        let _guard = self.in_flight.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panics {
            panic!("stub task '{}' panicked", self.name);
        }
        if invocation <= self.fail_first {
            return Err(self.failure.clone());
        }
        Ok(match input {
            TaskData::Value(value) => TaskOutput::Value(value),
            TaskData::Items(items) => TaskOutput::items(items),
        })
    }
}
