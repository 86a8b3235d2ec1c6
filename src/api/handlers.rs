//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use tracing::debug;

use crate::cache::{json_weight, Cache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    GetResponse, HasResponse, HealthResponse, InvalidateResponse, MessageResponse, SetRequest,
    StatsResponse, SweepResponse,
};
use crate::persist::DurableStorage;

/// Application state shared across all handlers.
///
/// The cache handle is internally synchronized, so cloning the state is cheap
/// and handlers never hold a lock across an await.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Shared cache of JSON values
    pub cache: Cache<Value>,
}

impl AppState {
    /// Creates a new AppState around an existing cache.
    pub fn new(cache: Cache<Value>) -> Self {
        Self { cache }
    }

    /// Builds the server cache from configuration.
    ///
    /// Entries are weighed by their JSON length. With `storage` the cache is
    /// mirrored and reloads its last snapshot; without it the cache is
    /// memory-only.
    pub async fn open(config: Config, storage: Option<Arc<dyn DurableStorage>>) -> Result<Self> {
        let builder = Cache::<Value>::builder(config).weigher(json_weight::<Value>);
        let cache = match storage {
            Some(storage) => builder.open(storage).await?,
            None => builder.build()?,
        };
        Ok(Self::new(cache))
    }
}

/// Handler for PUT /set
///
/// Stores a JSON value in the cache with optional TTL, tags and persistence.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<MessageResponse>> {
    // Validate request
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let (key, value, options) = req.into_parts();
    state.cache.set(key.clone(), value, options)?;

    Ok(Json(MessageResponse::stored(key)))
}

/// Handler for GET /get/:key
///
/// Retrieves a value from the cache by key.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state
        .cache
        .get(&key)
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, Value::clone(&value))))
}

/// Handler for GET /has/:key
///
/// Reports whether a live entry exists without counting a read.
pub async fn has_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<HasResponse> {
    let exists = state.cache.has(&key);
    Json(HasResponse { key, exists })
}

/// Handler for DELETE /del/:key
///
/// Deletes a key from the cache.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<MessageResponse>> {
    if !state.cache.delete(&key) {
        return Err(CacheError::NotFound(key));
    }

    Ok(Json(MessageResponse::deleted(key)))
}

/// Handler for POST /invalidate/:tag
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Json<InvalidateResponse> {
    let removed = state.cache.invalidate_tag(&tag);
    debug!("Invalidated tag '{}': {} entries", tag, removed);
    Json(InvalidateResponse { tag, removed })
}

/// Handler for POST /clear
pub async fn clear_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.cache.clear();
    Json(MessageResponse::cleared())
}

/// Handler for POST /sweep
///
/// Runs an expiry sweep immediately.
pub async fn sweep_handler(State(state): State<AppState>) -> Json<SweepResponse> {
    Json(SweepResponse::from(state.cache.sweep()))
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.cache.stats(),
        state.cache.is_mirrored(),
    ))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
