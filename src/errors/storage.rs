// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{Classify, ErrorClass};
use crate::model::BackendKind;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a storage backend, either for a whole call or a single item.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("{backend} backend temporarily unavailable: {reason}")]
    Unavailable { backend: BackendKind, reason: String },

    #[error("{backend} backend write timed out after {timeout:?}")]
    Timeout { backend: BackendKind, timeout: Duration },

    #[error("{backend} backend is unreachable")]
    Unreachable { backend: BackendKind },

    #[error("{backend} backend rejected record '{record_id}': {reason}")]
    RejectedRecord {
        backend: BackendKind,
        record_id: String,
        reason: String,
    },

    #[error("{backend} backend rejected credentials")]
    AuthenticationFailure { backend: BackendKind },
}

impl Classify for StorageError {
    fn class(&self) -> ErrorClass {
        match self {
            StorageError::Unavailable { .. } | StorageError::Timeout { .. } => {
                ErrorClass::Transient
            }
            StorageError::RejectedRecord { .. } => ErrorClass::Data,
            StorageError::Unreachable { .. } | StorageError::AuthenticationFailure { .. } => {
                ErrorClass::Fatal
            }
        }
    }
}
