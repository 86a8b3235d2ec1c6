//! Response bodies
//!
//! Everything the server writes back is one of these, serialized as JSON.

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;
use crate::tasks::SweepReport;

/// Body of `GET /get/:key`
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Acknowledgement for mutating endpoints (`PUT /set`, `DELETE /del/:key`, `POST /clear`)
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
    /// Key the mutation applied to, absent for whole-cache operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl MessageResponse {
    pub fn stored(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("'{}' stored", key),
            key: Some(key),
        }
    }

    pub fn deleted(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("'{}' deleted", key),
            key: Some(key),
        }
    }

    pub fn cleared() -> Self {
        Self {
            message: "Cache cleared".to_string(),
            key: None,
        }
    }
}

/// Body of `GET /has/:key`
#[derive(Debug, Clone, Serialize)]
pub struct HasResponse {
    pub key: String,
    pub exists: bool,
}

/// Body of `POST /invalidate/:tag`
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub tag: String,
    /// Number of live entries removed
    pub removed: usize,
}

/// Body of `POST /sweep`
#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    pub expired: usize,
    pub evicted: usize,
    pub persisted: usize,
    /// True when another sweep was already running
    pub skipped: bool,
}

impl From<Option<SweepReport>> for SweepResponse {
    fn from(report: Option<SweepReport>) -> Self {
        let skipped = report.is_none();
        let report = report.unwrap_or_default();
        Self {
            expired: report.expired,
            evicted: report.evicted,
            persisted: report.persisted,
            skipped,
        }
    }
}

/// Body of `GET /stats`: the cache snapshot plus server-level flags
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Whether persistent entries are mirrored to durable storage
    pub mirrored: bool,
}

impl StatsResponse {
    pub fn new(stats: CacheStats, mirrored: bool) -> Self {
        Self { stats, mirrored }
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339 time the health check was answered
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Body returned with every non-2xx status
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
