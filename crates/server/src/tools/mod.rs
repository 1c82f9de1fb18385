//! MCP tool implementations.
//!
//! This module contains all tools exposed by the prerender server.

pub mod cache_len;
pub mod render;
