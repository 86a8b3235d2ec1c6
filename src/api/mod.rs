//! HTTP front-end over a `Cache<serde_json::Value>`.
//!
//! # Endpoints
//! - `PUT /set` - Store a JSON value with optional TTL, tags and persistence
//! - `GET /get/:key` - Read a value, counting a hit or miss
//! - `GET /has/:key` - Check for a live entry without counting a read
//! - `DELETE /del/:key` - Remove one entry from both tiers
//! - `POST /invalidate/:tag` - Remove every entry carrying a tag
//! - `POST /clear` - Empty the cache and reset statistics
//! - `POST /sweep` - Run an expiry sweep now
//! - `GET /stats` - Counters and memory usage
//! - `GET /health` - Liveness check

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
