//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Errors surfaced by the cache API and the HTTP front-end.
///
/// Internal faults (storage, serialization, timers) never show up here; they
/// are logged where they happen and the cache degrades to memory-only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Key not found in cache (or already expired)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A single entry is too large relative to the memory budget
    #[error("Entry '{key}' rejected: {size_bytes} bytes exceeds the {limit_bytes} byte entry limit")]
    CapacityRejected {
        key: String,
        size_bytes: usize,
        limit_bytes: usize,
    },

    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::CapacityRejected { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Mirror Error Enum ==
/// Failures at the durable mirror boundary.
///
/// These are caught and logged by the mirror; callers of the cache API never
/// see them.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// The durable storage backend refused or failed an operation
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A payload or snapshot could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored snapshot is not a usable document
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Unsupported snapshot version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u64, supported: u64 },
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
