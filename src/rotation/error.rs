use crate::credentials::{CredentialOperation, StoreError};
use crate::workspaces::WorkspaceApiError;

/// Errors that abort a rotation.
///
/// Per-record propagation problems are not errors; they are collected into
/// the [`RotationReport`](super::RotationReport) instead.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    /// Creation hit the key ceiling again after one eviction (or nothing could be evicted).
    #[error("({principal}) access key limit still exceeded after evicting {}", evicted.as_deref().unwrap_or("nothing"))]
    CeilingExceeded {
        principal: String,
        evicted: Option<String>,
    },

    #[error("({principal}) {operation} failed: {message}")]
    Provider {
        principal: String,
        operation: CredentialOperation,
        message: String,
    },

    #[error("({principal}) a new access key was already issued by this rotator")]
    AlreadyIssued { principal: String },

    #[error("({principal}) refusing to retire the previous key before a replacement was issued")]
    NoReplacement { principal: String },

    #[error("workspace snapshot failed: {0}")]
    Snapshot(#[from] WorkspaceApiError),
}

impl From<StoreError> for RotationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CeilingExceeded { principal } => RotationError::CeilingExceeded {
                principal,
                evicted: None,
            },
            StoreError::Provider {
                principal,
                operation,
                message,
            } => RotationError::Provider {
                principal,
                operation,
                message,
            },
        }
    }
}
