// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::ProviderError;

/// A single text to embed, keyed by the id of the item it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRequest {
    pub item_id: String,
    pub text: String,
}

impl EmbeddingRequest {
    pub fn new(item_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            text: text.into(),
        }
    }
}

/// Outcome of embedding one request.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingStatus {
    /// Always non-empty and finite.
    Embedded(Vec<f32>),
    Failed(ProviderError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    pub item_id: String,
    pub status: EmbeddingStatus,
}

impl EmbeddingResult {
    /// Builds a result from a raw provider vector, rejecting degenerate vectors.
    pub fn from_vector(item_id: String, vector: Vec<f32>) -> Self {
        let status = if is_valid_vector(&vector) {
            EmbeddingStatus::Embedded(vector)
        } else {
            EmbeddingStatus::Failed(ProviderError::EmptyVectorReturned)
        };
        Self { item_id, status }
    }

    pub fn failed(item_id: String, reason: ProviderError) -> Self {
        Self {
            item_id,
            status: EmbeddingStatus::Failed(reason),
        }
    }

    pub fn vector(&self) -> Option<&[f32]> {
        match &self.status {
            EmbeddingStatus::Embedded(v) => Some(v),
            EmbeddingStatus::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ProviderError> {
        match &self.status {
            EmbeddingStatus::Failed(err) => Some(err),
            EmbeddingStatus::Embedded(_) => None,
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.status, EmbeddingStatus::Embedded(_))
    }
}

/// A vector is usable only if it has at least one component and all components are finite.
pub fn is_valid_vector(vector: &[f32]) -> bool {
    !vector.is_empty() && vector.iter().all(|v| v.is_finite())
}
