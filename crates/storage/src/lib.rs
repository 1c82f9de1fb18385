//! Remote page cache service.
//!
//! Serves the cache capability over HTTP/JSON so several prerender servers can
//! share one store. The routes implement the contract described in
//! `prerender_core::cache::wire`, backed by the local LRU+TTL cache.

pub mod service;

pub use service::{StorageError, router};
