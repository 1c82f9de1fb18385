//! Core types and shared functionality for prerender.
//!
//! This crate provides:
//! - URL canonicalization and content-addressed cache keys
//! - The gzip page archive codec
//! - The `Cacher` capability with a local LRU+TTL backend
//! - Unified error types
//! - Configuration structures

pub mod archive;
pub mod cache;
pub mod canonical;
pub mod config;
pub mod error;

pub use cache::{CacheKey, Cacher, LocalCache};
pub use canonical::{Canonical, canonicalize};
pub use config::AppConfig;
pub use error::Error;
