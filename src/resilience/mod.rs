// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Retry and backoff shared by the embedding dispatcher, the storage coordinator and
//! the orchestrator. Each of them retries its own smallest unit of work (a batch, a
//! backend write, a task invocation); nothing here restarts a whole run.

mod policy;

pub use policy::{GiveUpReason, RetryDecision, RetryOutcome, RetryPolicy};
