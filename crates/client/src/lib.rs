//! Client code for prerender.
//!
//! This crate provides the browser renderer with its retry and restart
//! policy, the remote cache backend, the request executor and the
//! cache-warming sweep shared by the server binaries.

pub mod executor;
pub mod remote;
pub mod render;
pub mod warm;

pub use executor::Executor;
pub use remote::RemoteCache;
pub use render::{BrowserRenderer, DockerProcess, ManagedProcess, RenderPolicy, Renderer};
pub use warm::{WarmReport, warm};
