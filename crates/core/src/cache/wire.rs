//! Request and reply bodies of the remote cache service.
//!
//! The storage service exposes the cache capability over HTTP/JSON:
//!
//! | Operation | Request | Reply |
//! |-----------|---------|-------|
//! | store | `POST /v1/pages` with [`StoreRequest`] | [`StoreReply`] |
//! | get | `GET /v1/pages/{hash}` | [`GetReply`], or `404` with [`StatusReply`] |
//! | length | `GET /v1/len` | [`LenReply`] |
//! | health | `GET /v1/health` | [`HealthReply`] |
//!
//! Payloads travel base64-encoded.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CacheEntry, CacheKey, Error};

/// API version spoken by this build.
pub const API_VERSION: &str = "v1";

/// Status string of a not-found reply.
pub const STATUS_NOT_FOUND: &str = "not_found";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRequest {
    pub api_version: String,
    pub hash: CacheKey,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl StoreRequest {
    pub fn new(hash: CacheKey, entry: &CacheEntry) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            hash,
            payload: encode_payload(&entry.data),
            created_at: entry.created_at,
        }
    }

    /// Decode the payload into a cache entry.
    pub fn into_entry(self) -> Result<(CacheKey, CacheEntry), Error> {
        let data = decode_payload(&self.payload)?;
        Ok((self.hash, CacheEntry { data, created_at: self.created_at }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreReply {
    pub api_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetReply {
    pub hash: CacheKey,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl GetReply {
    pub fn new(hash: CacheKey, entry: &CacheEntry) -> Self {
        Self { hash, payload: encode_payload(&entry.data), created_at: entry.created_at }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LenReply {
    pub length: usize,
}

/// Liveness reply; `version` is the storage service's crate version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReply {
    pub status: String,
    pub api_version: String,
    pub version: String,
}

impl HealthReply {
    pub fn ok(version: &str) -> Self {
        Self { status: "ok".to_string(), api_version: API_VERSION.to_string(), version: version.to_string() }
    }
}

/// Non-success reply body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReply {
    pub fn not_found() -> Self {
        Self { status: STATUS_NOT_FOUND.to_string(), message: None }
    }

    pub fn error(status: &str, message: impl Into<String>) -> Self {
        Self { status: status.to_string(), message: Some(message.into()) }
    }
}

pub fn encode_payload(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// # Errors
///
/// Returns `Error::InvalidInput` if the payload is not valid base64.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, Error> {
    BASE64
        .decode(payload)
        .map_err(|e| Error::InvalidInput(format!("invalid payload encoding: {e}")))
}
