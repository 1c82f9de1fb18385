//! Remote cache backend speaking the storage service's HTTP/JSON contract.
//!
//! Failure mapping:
//!
//! - put: any failure is `Error::CacheWrite`
//! - get: `404` and transport failures are `Error::CacheMiss`, so a down
//!   storage service degrades to re-rendering; other statuses and malformed
//!   replies are `Error::CacheError`
//! - len: any failure is `Error::CacheError`

use std::time::Duration;

use prerender_core::Error;
use prerender_core::cache::wire::{GetReply, LenReply, StoreReply, StoreRequest, decode_payload};
use prerender_core::cache::{CacheEntry, CacheKey, Cacher};
use reqwest::StatusCode;
use url::Url;

/// Default request timeout against the storage service.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`Cacher`] delegating to a remote storage service.
#[derive(Debug, Clone)]
pub struct RemoteCache {
    http: reqwest::Client,
    base: Url,
}

impl RemoteCache {
    /// Create a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `base_url` is not an absolute URL.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let mut base = Url::parse(base_url).map_err(|e| Error::InvalidInput(format!("remote cache url: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidInput(format!("remote cache client: {e}")))?;

        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base
            .join(path)
            .map_err(|e| Error::InvalidInput(format!("remote cache path {path}: {e}")))
    }
}

#[async_trait::async_trait]
impl Cacher for RemoteCache {
    async fn put(&self, key: &CacheKey, data: Vec<u8>) -> Result<(), Error> {
        let url = self.endpoint("v1/pages").map_err(|e| Error::CacheWrite(e.to_string()))?;
        let request = StoreRequest::new(key.clone(), &CacheEntry::new(data));

        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::CacheWrite(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::CacheWrite(format!("storage replied {status}: {body}")));
        }

        let reply: StoreReply = response.json().await.map_err(|e| Error::CacheWrite(e.to_string()))?;
        tracing::debug!(hash = %key, api_version = %reply.api_version, "stored page remotely");
        Ok(())
    }

    async fn get(&self, key: &CacheKey) -> Result<Vec<u8>, Error> {
        let url = self.endpoint(&format!("v1/pages/{key}"))?;

        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(hash = %key, error = %e, "remote cache unreachable, treating as miss");
                return Err(Error::CacheMiss(key.to_string()));
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::CacheMiss(key.to_string()));
        }
        if !status.is_success() {
            return Err(Error::CacheError(format!("storage replied {status} for {key}")));
        }

        let reply: GetReply = response
            .json()
            .await
            .map_err(|e| Error::CacheError(format!("malformed get reply: {e}")))?;
        if &reply.hash != key {
            return Err(Error::CacheError(format!("storage returned {} for {key}", reply.hash)));
        }

        decode_payload(&reply.payload).map_err(|e| Error::CacheError(e.to_string()))
    }

    async fn len(&self) -> Result<usize, Error> {
        let url = self.endpoint("v1/len")?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::CacheError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::CacheError(format!("storage replied {status} for len")));
        }

        let reply: LenReply = response
            .json()
            .await
            .map_err(|e| Error::CacheError(format!("malformed len reply: {e}")))?;
        Ok(reply.length)
    }
}
