//! Error types for the background service

use std::time::Duration;

use iz_compiler::ReconcileError;

/// Failure of the persistent storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt storage data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Backend(String),
}

/// The platform refused or failed a rule update.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Rule ID {0} is not allowed")]
    InvalidId(u32),
    #[error("Duplicate rule ID {0}")]
    DuplicateId(u32),
    #[error("Dynamic rule quota of {quota} exceeded ({requested} requested)")]
    QuotaExceeded { quota: usize, requested: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt rule data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Rejected(String),
}

/// Error surfaced by the background service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Platform rule update failed: {0}")]
    PlatformUpdate(#[from] PlatformError),
    #[error("Platform rule update timed out after {0:?}")]
    PlatformTimeout(Duration),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Unknown action")]
    UnknownAction,
}
