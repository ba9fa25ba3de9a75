// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;      // built-in tasks, provider and stores
pub mod config;        // config + runtime builder
pub mod engine;        // dispatcher, fan-out, orchestrator
pub mod errors;        // error handling
pub mod model;         // work items, batches, embeddings
pub mod observability;
pub mod resilience;    // retry/backoff
pub mod traits;        // unified abstractions
