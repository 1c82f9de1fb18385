//! Unified error types for prerender.
//!
//! Only `RedirectRequired`, `RenderExhausted` and `NotResponding` are meant to
//! reach an end user; the rest are resolved or logged by the executor.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Unified error types for the prerender service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// URL could not be parsed or uses an unsupported scheme.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Non-root path with a trailing slash; the caller should redirect.
    #[error("REDIRECT_REQUIRED: {location}")]
    RedirectRequired { location: String },

    /// No live cache entry for the given key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Storing an entry failed.
    #[error("CACHE_WRITE_FAILED: {0}")]
    CacheWrite(String),

    /// Cache backend failure other than a miss or a write.
    #[error("CACHE_ERROR: {0}")]
    CacheError(String),

    /// Page archive could not be compressed or decompressed.
    #[error("ARCHIVE_ERROR: {0}")]
    Archive(String),

    /// Every retry budget was spent without a rendered document.
    #[error("RENDER_EXHAUSTED: {0}")]
    RenderExhausted(String),

    /// The browser endpoint stayed in restart longer than the wait budget.
    #[error("NOT_RESPONDING: browser endpoint is restarting")]
    NotResponding,
}

impl Error {
    /// Whether this error is the cache NotFound signal.
    pub fn is_miss(&self) -> bool {
        matches!(self, Error::CacheMiss(_))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::RedirectRequired { location } => (-32013, format!("redirect required: {location}")),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::CacheWrite(msg) => (-32002, msg.clone()),
            Error::CacheError(msg) => (-32002, msg.clone()),
            Error::Archive(msg) => (-32002, msg.clone()),
            Error::RenderExhausted(msg) => (-32012, msg.clone()),
            Error::NotResponding => (-32014, "Browser endpoint is not responding".to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
