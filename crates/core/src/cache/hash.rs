//! Content-addressed cache key generation.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Error;

/// Hex-encoded SHA-256 of a canonical key string.
///
/// Deserialization goes through [`CacheKey::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Accept an already computed key, e.g. one received over the wire.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` unless the value is 64 lowercase hex digits.
    pub fn parse(hex_key: &str) -> Result<Self, Error> {
        let valid = hex_key.len() == 64 && hex_key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(Error::InvalidInput(format!("invalid cache key: {hex_key}")));
        }
        Ok(Self(hex_key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CacheKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the cache key for a canonical `host + path` string.
pub fn compute_cache_key(canonical: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    CacheKey(hex::encode(hasher.finalize()))
}
