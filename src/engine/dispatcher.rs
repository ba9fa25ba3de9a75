// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded, batched embedding dispatch.
//!
//! The dispatcher turns one `submit` call into batches of at most `batch_size`
//! requests and hands them to a small pool of workers. Every provider call
//! needs a permit from a semaphore of `concurrency_limit` permits. The
//! semaphore belongs to the dispatcher, not to the submission, so concurrent
//! `submit` calls share the same bound and the provider never sees more than
//! `concurrency_limit` calls in flight.
//!
//! ```text
//!  submit(12 items, batch_size=5, limit=2)
//!
//!   queue: [b0 (5)] [b1 (5)] [b2 (2)]
//!             │        │
//!          worker0  worker1        <- each call holds a permit
//!             │        │
//!          (delay)  (delay)        <- inter_batch_delay between a worker's batches
//!             └── b2 ──┘           <- waits for a free worker and permit
//! ```
//!
//! A batch is retried as a unit under the shared [`RetryPolicy`] when the call
//! fails, times out, or returns any empty or non-finite vector. When retries run
//! out every item in the batch is marked failed; sibling batches are unaffected.
//! Results always come back in submission order.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::consts::{
    DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_EMBEDDING_CALL_TIMEOUT_MS,
    DEFAULT_EMBEDDING_CONCURRENCY_LIMIT, DEFAULT_INTER_BATCH_DELAY_MS,
};
use crate::errors::ProviderError;
use crate::model::{is_valid_vector, EmbeddingRequest, EmbeddingResult};
use crate::observability::messages::dispatch::{
    BatchFailed, BatchRetrying, DispatchCompleted, DispatchStarted,
};
use crate::observability::messages::StructuredLog;
use crate::resilience::{RetryDecision, RetryPolicy};
use crate::traits::EmbeddingProvider;

/// Limits applied to outbound embedding calls.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    /// Maximum provider calls in flight across all submissions.
    pub concurrency_limit: usize,
    /// Maximum requests per provider call.
    pub batch_size: usize,
    /// Pause a worker takes between two of its own dispatches. Zero disables it.
    pub inter_batch_delay: Duration,
    /// Timeout of a single provider call, distinct from the retry ceiling.
    pub call_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_EMBEDDING_CONCURRENCY_LIMIT,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            inter_batch_delay: Duration::from_millis(DEFAULT_INTER_BATCH_DELAY_MS),
            call_timeout: Duration::from_millis(DEFAULT_EMBEDDING_CALL_TIMEOUT_MS),
        }
    }
}

type Batch = (usize, Vec<EmbeddingRequest>);
type BatchQueue = Arc<Mutex<VecDeque<Batch>>>;

/// Issues embedding calls to a provider under a fixed concurrency bound.
pub struct EmbeddingDispatcher {
    provider: Arc<dyn EmbeddingProvider>,
    settings: DispatchSettings,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl EmbeddingDispatcher {
    /// Creates a dispatcher. Concurrency limit and batch size are clamped to at least 1.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        mut settings: DispatchSettings,
        retry: RetryPolicy,
    ) -> Self {
        settings.concurrency_limit = settings.concurrency_limit.max(1);
        settings.batch_size = settings.batch_size.max(1);
        let permits = Arc::new(Semaphore::new(settings.concurrency_limit));
        Self {
            provider,
            settings,
            retry,
            permits,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Permits not currently held by an in-flight provider call.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Embeds `requests`, returning one result per request in input order.
    pub async fn submit(&self, requests: Vec<EmbeddingRequest>) -> Vec<EmbeddingResult> {
        self.submit_with_cancel(requests, &CancellationToken::new())
            .await
    }

    /// Like [`submit`](Self::submit), but stops starting new batches once `cancel`
    /// fires. Batches never started resolve to [`ProviderError::Cancelled`];
    /// calls already in flight are allowed to finish.
    pub async fn submit_with_cancel(
        &self,
        requests: Vec<EmbeddingRequest>,
        cancel: &CancellationToken,
    ) -> Vec<EmbeddingResult> {
        if requests.is_empty() {
            return Vec::new();
        }
        let started = Instant::now();
        let item_count = requests.len();
        let batches = split_into_batches(requests, self.settings.batch_size);
        let batch_count = batches.len();

        DispatchStarted {
            item_count,
            batch_count,
            concurrency_limit: self.settings.concurrency_limit,
        }
        .log();

        // Item ids per batch, needed to fill in batches that never complete.
        let batch_ids: Vec<Vec<String>> = batches
            .iter()
            .map(|(_, batch)| batch.iter().map(|r| r.item_id.clone()).collect())
            .collect();

        let queue: BatchQueue = Arc::new(Mutex::new(batches.into_iter().collect()));
        let worker_count = self.settings.concurrency_limit.min(batch_count);
        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            let worker = DispatchWorker {
                provider: self.provider.clone(),
                permits: self.permits.clone(),
                settings: self.settings.clone(),
                retry: self.retry.clone(),
                queue: queue.clone(),
                cancel: cancel.clone(),
            };
            workers.spawn(worker.run());
        }

        let mut completed: Vec<Option<Vec<EmbeddingResult>>> = vec![None; batch_count];
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(done) => {
                    for (index, results) in done {
                        completed[index] = Some(results);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "embedding dispatch worker aborted");
                }
            }
        }

        let mut results = Vec::with_capacity(item_count);
        for (index, batch) in completed.into_iter().enumerate() {
            match batch {
                Some(batch_results) => results.extend(batch_results),
                None => {
                    let reason = if cancel.is_cancelled() {
                        ProviderError::Cancelled
                    } else {
                        ProviderError::ProviderUnavailable("dispatch worker aborted".into())
                    };
                    results.extend(
                        batch_ids[index]
                            .iter()
                            .map(|id| EmbeddingResult::failed(id.clone(), reason.clone())),
                    );
                }
            }
        }

        DispatchCompleted {
            item_count,
            failed_count: results.iter().filter(|r| !r.is_embedded()).count(),
            duration: started.elapsed(),
        }
        .log();

        results
    }
}

fn split_into_batches(requests: Vec<EmbeddingRequest>, batch_size: usize) -> Vec<Batch> {
    let mut batches = Vec::with_capacity(requests.len().div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size);
    for request in requests {
        current.push(request);
        if current.len() == batch_size {
            batches.push((batches.len(), std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        batches.push((batches.len(), current));
    }
    batches
}

/// One member of a submission's worker pool.
struct DispatchWorker {
    provider: Arc<dyn EmbeddingProvider>,
    permits: Arc<Semaphore>,
    settings: DispatchSettings,
    retry: RetryPolicy,
    queue: BatchQueue,
    cancel: CancellationToken,
}

impl DispatchWorker {
    async fn run(self) -> Vec<(usize, Vec<EmbeddingResult>)> {
        let mut done = Vec::new();
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let next = self.queue.lock().pop_front();
            let Some((index, batch)) = next else {
                break;
            };
            if !done.is_empty() && !self.settings.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_batch_delay).await;
                if self.cancel.is_cancelled() {
                    break;
                }
            }
            let results = self.dispatch_batch(index, batch).await;
            done.push((index, results));
        }
        done
    }

    async fn dispatch_batch(
        &self,
        index: usize,
        batch: Vec<EmbeddingRequest>,
    ) -> Vec<EmbeddingResult> {
        let texts: Arc<Vec<String>> = Arc::new(batch.iter().map(|r| r.text.clone()).collect());

        let outcome = self
            .retry
            .run(Some(&self.cancel), |attempt| {
                let texts = texts.clone();
                async move {
                    let result = self.call_provider(&texts).await;
                    if let Err(err) = &result {
                        if let RetryDecision::Retry { .. } = self.retry.decide(err, attempt) {
                            BatchRetrying {
                                batch_index: index,
                                attempt,
                                error: err,
                            }
                            .log();
                        }
                    }
                    result
                }
            })
            .await;

        match outcome.result {
            Ok(vectors) => batch
                .into_iter()
                .zip(vectors)
                .map(|(request, vector)| EmbeddingResult::from_vector(request.item_id, vector))
                .collect(),
            Err(BatchError { batch: err, items }) => {
                BatchFailed {
                    batch_index: index,
                    item_count: batch.len(),
                    attempts: outcome.attempts,
                    error: &err,
                }
                .log();
                batch
                    .into_iter()
                    .enumerate()
                    .map(|(i, request)| {
                        let reason = items
                            .as_ref()
                            .and_then(|per_item| per_item.get(i).cloned().flatten())
                            .unwrap_or_else(|| err.clone());
                        EmbeddingResult::failed(request.item_id, reason)
                    })
                    .collect()
            }
        }
    }

    /// One provider call under a permit and the per-call timeout.
    async fn call_provider(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BatchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| BatchError::from(ProviderError::ProviderUnavailable("dispatcher closed".into())))?;

        let response = tokio::time::timeout(self.settings.call_timeout, self.provider.embed(texts))
            .await
            .map_err(|_| BatchError::from(ProviderError::ProviderTimeout(self.settings.call_timeout)))?
            .map_err(BatchError::from)?;

        validate_response(response, texts.len())
    }
}

/// Why a batch attempt failed: the batch-level error plus, when the provider
/// answered, the error for each item that was bad.
#[derive(Debug, Clone)]
struct BatchError {
    batch: ProviderError,
    items: Option<Vec<Option<ProviderError>>>,
}

impl From<ProviderError> for BatchError {
    fn from(batch: ProviderError) -> Self {
        Self { batch, items: None }
    }
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.batch.fmt(f)
    }
}

impl std::error::Error for BatchError {}

impl crate::errors::Classify for BatchError {
    fn class(&self) -> crate::errors::ErrorClass {
        self.batch.class()
    }

    fn retry_after(&self) -> Option<Duration> {
        self.batch.retry_after()
    }
}

/// Accepts a provider response only if it has one valid vector per request.
fn validate_response(
    response: Vec<Result<Vec<f32>, ProviderError>>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, BatchError> {
    if response.len() != expected {
        return Err(ProviderError::MalformedResponse {
            expected,
            received: response.len(),
        }
        .into());
    }

    let mut vectors = Vec::with_capacity(expected);
    let mut item_errors: Vec<Option<ProviderError>> = Vec::with_capacity(expected);
    let mut first_error: Option<ProviderError> = None;
    for entry in response {
        let error = match entry {
            Ok(vector) if is_valid_vector(&vector) => {
                vectors.push(vector);
                None
            }
            Ok(_) => Some(ProviderError::EmptyVectorReturned),
            Err(err) => Some(err),
        };
        if first_error.is_none() {
            first_error = error.clone();
        }
        item_errors.push(error);
    }

    match first_error {
        None => Ok(vectors),
        Some(batch) => Err(BatchError {
            batch,
            items: Some(item_errors),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{ConcurrencyProbeProvider, ScriptedProvider, ScriptedResponse};
    use crate::errors::Classify;
    use crate::model::EmbeddingStatus;

    fn requests(n: usize) -> Vec<EmbeddingRequest> {
        (0..n)
            .map(|i| EmbeddingRequest::new(format!("item-{}", i), format!("text {}", i)))
            .collect()
    }

    fn settings(limit: usize, batch_size: usize) -> DispatchSettings {
        DispatchSettings {
            concurrency_limit: limit,
            batch_size,
            inter_batch_delay: Duration::ZERO,
            call_timeout: Duration::from_secs(5),
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_split_into_batches() {
        let batches = split_into_batches(requests(12), 5);
        let sizes: Vec<usize> = batches.iter().map(|(_, b)| b.len()).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        assert_eq!(batches[2].0, 2);
        assert_eq!(batches[2].1[0].item_id, "item-10");
    }

    #[tokio::test(start_paused = true)]
    async fn test_twelve_items_three_batches_two_in_flight() {
        let provider = Arc::new(ConcurrencyProbeProvider::new(Duration::from_millis(50)));
        let dispatcher = EmbeddingDispatcher::new(provider.clone(), settings(2, 5), fast_retry(3));

        let results = dispatcher.submit(requests(12)).await;

        assert_eq!(results.len(), 12);
        assert!(results.iter().all(|r| r.is_embedded()));
        assert_eq!(provider.calls(), 3);
        assert_eq!(provider.batch_sizes(), vec![5, 5, 2]);
        assert!(provider.max_in_flight() <= 2);
        assert_eq!(provider.max_in_flight(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_preserve_input_order() {
        let provider = Arc::new(ConcurrencyProbeProvider::new(Duration::from_millis(5)));
        let dispatcher = EmbeddingDispatcher::new(provider, settings(3, 2), fast_retry(3));

        let input = requests(9);
        let results = dispatcher.submit(input.clone()).await;

        let ids: Vec<&str> = results.iter().map(|r| r.item_id.as_str()).collect();
        let expected: Vec<&str> = input.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submissions_share_the_bound() {
        let provider = Arc::new(ConcurrencyProbeProvider::new(Duration::from_millis(20)));
        let dispatcher = Arc::new(EmbeddingDispatcher::new(
            provider.clone(),
            settings(2, 1),
            fast_retry(3),
        ));

        let a = dispatcher.submit(requests(6));
        let b = dispatcher.submit(requests(6));
        let (ra, rb) = tokio::join!(a, b);

        assert_eq!(ra.len() + rb.len(), 12);
        assert!(provider.max_in_flight() <= 2);
        assert_eq!(dispatcher.available_permits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_vector_batch_is_retried_then_failed() {
        let provider = Arc::new(ScriptedProvider::always(ScriptedResponse::EmptyVectors));
        let dispatcher = EmbeddingDispatcher::new(provider.clone(), settings(2, 4), fast_retry(3));

        let results = dispatcher.submit(requests(4)).await;

        assert_eq!(provider.calls(), 3);
        assert!(results
            .iter()
            .all(|r| r.status == EmbeddingStatus::Failed(ProviderError::EmptyVectorReturned)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_empty_vector_fails_whole_batch_only() {
        // Call 1 (batch 0): one empty vector. Retries and batch 1 succeed.
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedResponse::EmptyAt(1),
            ScriptedResponse::EmptyAt(1),
        ]));
        let dispatcher = EmbeddingDispatcher::new(provider.clone(), settings(1, 2), fast_retry(2));

        let results = dispatcher.submit(requests(4)).await;

        assert!(!results[0].is_embedded());
        assert_eq!(
            results[1].error(),
            Some(&ProviderError::EmptyVectorReturned)
        );
        assert!(results[2].is_embedded());
        assert!(results[3].is_embedded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_recovers_on_retry() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedResponse::Error(ProviderError::RateLimited {
                retry_after: Some(Duration::from_millis(30)),
            }),
            ScriptedResponse::Ok,
        ]));
        let dispatcher = EmbeddingDispatcher::new(provider.clone(), settings(1, 3), fast_retry(3));

        let results = dispatcher.submit(requests(3)).await;

        assert_eq!(provider.calls(), 2);
        assert!(results.iter().all(|r| r.is_embedded()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_failure_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::always(ScriptedResponse::Error(
            ProviderError::AuthenticationFailure("bad key".into()),
        )));
        let dispatcher = EmbeddingDispatcher::new(provider.clone(), settings(1, 5), fast_retry(3));

        let results = dispatcher.submit(requests(2)).await;

        assert_eq!(provider.calls(), 1);
        assert!(results
            .iter()
            .all(|r| r.error().map(|e| e.class()) == Some(crate::errors::ErrorClass::Fatal)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let provider = Arc::new(ConcurrencyProbeProvider::new(Duration::from_secs(10)));
        let mut s = settings(1, 5);
        s.call_timeout = Duration::from_secs(1);
        let dispatcher = EmbeddingDispatcher::new(provider.clone(), s, fast_retry(2));

        let results = dispatcher.submit(requests(2)).await;

        assert_eq!(provider.calls(), 2);
        assert_eq!(
            results[0].error(),
            Some(&ProviderError::ProviderTimeout(Duration::from_secs(1)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_batch_delay_spaces_a_workers_dispatches() {
        let provider = Arc::new(ConcurrencyProbeProvider::new(Duration::ZERO));
        let mut s = settings(1, 1);
        s.inter_batch_delay = Duration::from_millis(100);
        let dispatcher = EmbeddingDispatcher::new(provider, s, fast_retry(1));

        let started = tokio::time::Instant::now();
        dispatcher.submit(requests(3)).await;

        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_submission_fails_unstarted_batches() {
        let provider = Arc::new(ConcurrencyProbeProvider::new(Duration::from_millis(10)));
        let dispatcher = EmbeddingDispatcher::new(provider.clone(), settings(1, 1), fast_retry(1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = dispatcher.submit_with_cancel(requests(3), &cancel).await;

        assert_eq!(provider.calls(), 0);
        assert!(results
            .iter()
            .all(|r| r.error() == Some(&ProviderError::Cancelled)));
    }

    #[test]
    fn test_validate_response_rejects_length_mismatch() {
        let err = validate_response(vec![Ok(vec![1.0])], 2).unwrap_err();
        assert_eq!(
            err.batch,
            ProviderError::MalformedResponse {
                expected: 2,
                received: 1
            }
        );
    }

    #[tokio::test]
    async fn test_empty_submission_returns_nothing() {
        let provider = Arc::new(ConcurrencyProbeProvider::new(Duration::ZERO));
        let dispatcher = EmbeddingDispatcher::new(provider.clone(), settings(2, 2), fast_retry(1));
        assert!(dispatcher.submit(vec![]).await.is_empty());
        assert_eq!(provider.calls(), 0);
    }
}
