//! HTTP routes of the storage service.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use prerender_core::cache::wire::{
    API_VERSION, GetReply, HealthReply, LenReply, StatusReply, StoreReply, StoreRequest,
};
use prerender_core::{CacheKey, Error, LocalCache};

/// Failures reported to storage clients.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unsupported api version: {0}")]
    UnsupportedVersion(String),

    #[error(transparent)]
    Cache(#[from] Error),
}

impl IntoResponse for StorageError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            StorageError::UnsupportedVersion(_) => {
                (StatusCode::BAD_REQUEST, StatusReply::error("unsupported_version", self.to_string()))
            }
            StorageError::Cache(Error::CacheMiss(_)) => (StatusCode::NOT_FOUND, StatusReply::not_found()),
            StorageError::Cache(Error::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, StatusReply::error("invalid_input", self.to_string()))
            }
            StorageError::Cache(_) => {
                tracing::error!(error = %self, "storage request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, StatusReply::error("internal", self.to_string()))
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Largest accepted store request body. Payloads are base64, so this admits
/// compressed pages of about 6 MiB.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub fn router(cache: Arc<LocalCache>) -> Router {
    Router::new()
        .route("/v1/pages", post(store_page).layer(DefaultBodyLimit::max(MAX_BODY_BYTES)))
        .route("/v1/pages/{hash}", get(get_page))
        .route("/v1/len", get(cache_len))
        .route("/v1/health", get(health))
        .with_state(cache)
}

async fn store_page(
    State(cache): State<Arc<LocalCache>>, Json(request): Json<StoreRequest>,
) -> Result<Json<StoreReply>, StorageError> {
    if request.api_version != API_VERSION {
        return Err(StorageError::UnsupportedVersion(request.api_version));
    }

    let (hash, entry) = request.into_entry()?;
    tracing::debug!(hash = %hash, bytes = entry.data.len(), "storing page");
    cache.insert(hash, entry);

    Ok(Json(StoreReply { api_version: API_VERSION.to_string() }))
}

async fn get_page(
    State(cache): State<Arc<LocalCache>>, Path(hash): Path<String>,
) -> Result<Json<GetReply>, StorageError> {
    let key = CacheKey::parse(&hash)?;
    let entry = cache.entry(&key)?;
    Ok(Json(GetReply::new(key, &entry)))
}

async fn cache_len(State(cache): State<Arc<LocalCache>>) -> Json<LenReply> {
    Json(LenReply { length: cache.live_len() })
}

async fn health() -> Json<HealthReply> {
    Json(HealthReply::ok(env!("CARGO_PKG_VERSION")))
}
