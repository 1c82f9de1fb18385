//! Headless browser rendering for JS-heavy pages.
//!
//! The [`BrowserRenderer`] owns one shared automation endpoint and turns a URL
//! into the serialized outer HTML of its document, retrying and recovering the
//! endpoint when it misbehaves. The browser itself sits behind three narrow
//! traits so the retry logic runs without Chrome:
//!
//! - [`Launcher`] resolves the endpoint (remote DevTools or a local instance)
//! - [`Allocator`] opens one [`BrowsingSession`] per render attempt
//! - [`ManagedProcess`] restarts the container hosting a remote browser
//!
//! With the `chromium` feature, [`chromium`] provides the chromiumoxide-backed
//! implementations.

#[cfg(feature = "chromium")]
pub mod chromium;
mod engine;
pub mod process;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use prerender_core::{AppConfig, Error};
use url::Url;

pub use engine::BrowserRenderer;
pub use process::{DockerProcess, ManagedProcess, ProcessError};

/// Failure of a single render attempt, classified for the retry policy.
///
/// These never leave the renderer; callers only see
/// `Error::RenderExhausted` or `Error::NotResponding`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderFailure {
    /// The automation endpoint could not be reached.
    #[error("could not dial browser endpoint: {0}")]
    Dial(String),

    /// The document node went stale while extracting HTML.
    #[error("document node not found: {0}")]
    NodeNotFound(String),

    /// No local browser executable is available.
    #[error("browser executable missing: {0}")]
    ExecutableMissing(String),

    /// The session exceeded its deadline.
    #[error("session deadline exceeded")]
    DeadlineExceeded,

    /// The session was canceled underneath the render.
    #[error("session canceled: {0}")]
    Canceled(String),

    /// Anything else the browser reported.
    #[error("browser error: {0}")]
    Other(String),
}

impl RenderFailure {
    /// Short class name used in logs.
    pub fn class(&self) -> &'static str {
        match self {
            RenderFailure::Dial(_) => "dial",
            RenderFailure::NodeNotFound(_) => "node_not_found",
            RenderFailure::ExecutableMissing(_) => "executable_missing",
            RenderFailure::DeadlineExceeded => "deadline_exceeded",
            RenderFailure::Canceled(_) => "canceled",
            RenderFailure::Other(_) => "other",
        }
    }
}

/// Classify a raw browser error message.
pub fn classify(message: &str) -> RenderFailure {
    let lower = message.to_lowercase();

    if lower.contains("could not dial")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("failed to connect")
        || lower.contains("websocket")
        || lower.contains("receiver is gone")
        || lower.contains("oneshot canceled")
        || lower.contains("no response from the chromium instance")
    {
        RenderFailure::Dial(message.to_string())
    } else if lower.contains("could not find node with given id") || lower.contains("no node with given id") {
        RenderFailure::NodeNotFound(message.to_string())
    } else if lower.contains("could not auto detect a chrome executable")
        || lower.contains("executable file not found")
        || (lower.contains("executable") && lower.contains("not found"))
    {
        RenderFailure::ExecutableMissing(message.to_string())
    } else if lower.contains("deadline") || lower.contains("timed out") || lower.contains("timeout") {
        RenderFailure::DeadlineExceeded
    } else if lower.contains("canceled") || lower.contains("cancelled") {
        RenderFailure::Canceled(message.to_string())
    } else {
        RenderFailure::Other(message.to_string())
    }
}

/// Retry, backoff and restart budgets of a [`BrowserRenderer`].
///
/// Every `*_attempts` value is the number of failed attempts of that class a
/// single render tolerates before giving up.
#[derive(Debug, Clone)]
pub struct RenderPolicy {
    /// Hard deadline of one browsing session.
    pub session_timeout: Duration,
    /// Delay between navigation and HTML extraction.
    pub settle_delay: Duration,
    /// URL patterns the session refuses to load.
    pub blocked_urls: Vec<String>,
    /// Extra headers attached to page requests.
    pub headers: BTreeMap<String, String>,

    /// Polls while another task restarts the endpoint.
    pub restart_wait_attempts: u32,
    pub restart_poll_interval: Duration,

    /// Consecutive dial failures that trigger the restart routine. Any other
    /// failure class in between resets the streak.
    pub dial_restart_threshold: u32,
    pub dial_attempts: u32,
    pub dial_backoff: Duration,
    /// Restart routines one render may enter.
    pub max_restarts: u32,

    /// Same-session re-extractions after a stale node.
    pub node_retries: u32,
    /// Endpoint reinitializations after a missing executable.
    pub reinit_attempts: u32,

    pub timeout_attempts: u32,
    pub timeout_backoff: Duration,

    pub other_attempts: u32,
    pub other_backoff: Duration,

    /// Minimum time between two restart commands.
    pub restart_cooldown: Duration,
    /// Pause taken instead of a restart while the cooldown is active.
    pub cooldown_pause: Duration,
    /// Health checks after a restart command before giving the endpoint back.
    pub health_checks: u32,
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(60),
            settle_delay: Duration::from_millis(200),
            blocked_urls: Vec::new(),
            headers: BTreeMap::new(),
            restart_wait_attempts: 5,
            restart_poll_interval: Duration::from_secs(5),
            dial_restart_threshold: 3,
            dial_attempts: 9,
            dial_backoff: Duration::from_secs(1),
            max_restarts: 1,
            node_retries: 3,
            reinit_attempts: 2,
            timeout_attempts: 4,
            timeout_backoff: Duration::from_secs(3),
            other_attempts: 4,
            other_backoff: Duration::from_secs(1),
            restart_cooldown: Duration::from_secs(180),
            cooldown_pause: Duration::from_secs(5),
            health_checks: 5,
        }
    }
}

impl RenderPolicy {
    /// Policy with the configured deadlines, blocked URLs, headers and cooldown.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            session_timeout: config.session_timeout(),
            settle_delay: config.settle_delay(),
            blocked_urls: config.blocked_domains.clone(),
            headers: config.request_headers.clone(),
            restart_cooldown: config.restart_cooldown(),
            ..Self::default()
        }
    }
}

/// Renderer trait for headless browser page rendering.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Render a URL to its serialized document HTML.
    ///
    /// # Errors
    ///
    /// Returns `Error::RenderExhausted` once every retry budget is spent, or
    /// `Error::NotResponding` if the endpoint stays in restart too long.
    async fn render(&self, url: &Url) -> Result<String, Error>;
}

/// A resolved automation endpoint.
#[derive(Clone)]
pub struct Endpoint {
    /// Opens browsing sessions on this endpoint.
    pub allocator: Arc<dyn Allocator>,
    /// Whether the endpoint is a remote browser that a [`ManagedProcess`] can
    /// restart. A locally launched browser has nothing to restart.
    pub remote: bool,
}

/// Resolves the automation endpoint.
#[async_trait::async_trait]
pub trait Launcher: Send + Sync {
    /// Bind to the remote endpoint if discovery finds one, else start a local
    /// browser.
    async fn launch(&self) -> Result<Endpoint, RenderFailure>;
}

/// Creates browsing sessions; must allow concurrent calls.
#[async_trait::async_trait]
pub trait Allocator: Send + Sync {
    async fn new_session(&self) -> Result<Box<dyn BrowsingSession>, RenderFailure>;
}

/// One isolated browser tab used for a single render attempt.
#[async_trait::async_trait]
pub trait BrowsingSession: Send {
    /// Refuse to load requests matching any of `patterns`.
    async fn block_urls(&mut self, patterns: &[String]) -> Result<(), RenderFailure>;

    /// Attach `headers` to every request of the session.
    async fn set_headers(&mut self, headers: &BTreeMap<String, String>) -> Result<(), RenderFailure>;

    async fn navigate(&mut self, url: &Url) -> Result<(), RenderFailure>;

    /// Serialized outer HTML of the document root.
    async fn outer_html(&mut self) -> Result<String, RenderFailure>;

    /// Release the session's browser resources.
    async fn close(self: Box<Self>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_dial() {
        let failure = classify("could not dial \"ws://127.0.0.1:9222/devtools/browser/abc\": connection refused");
        assert!(matches!(failure, RenderFailure::Dial(_)));
        assert!(matches!(classify("Connection refused (os error 111)"), RenderFailure::Dial(_)));
    }

    #[test]
    fn test_classify_dead_browser_handle() {
        assert!(matches!(classify("send failed because receiver is gone"), RenderFailure::Dial(_)));
        assert!(matches!(classify("oneshot canceled"), RenderFailure::Dial(_)));
        assert!(matches!(classify("Received no response from the chromium instance."), RenderFailure::Dial(_)));
    }

    #[test]
    fn test_classify_node_not_found() {
        let failure = classify("Could not find node with given id");
        assert!(matches!(failure, RenderFailure::NodeNotFound(_)));
    }

    #[test]
    fn test_classify_executable_missing() {
        assert!(matches!(
            classify("Could not auto detect a chrome executable"),
            RenderFailure::ExecutableMissing(_)
        ));
        assert!(matches!(
            classify("exec: \"google-chrome\": executable file not found in $PATH"),
            RenderFailure::ExecutableMissing(_)
        ));
    }

    #[test]
    fn test_classify_deadline_and_cancel() {
        assert!(matches!(classify("Request timed out."), RenderFailure::DeadlineExceeded));
        assert!(matches!(classify("context deadline exceeded"), RenderFailure::DeadlineExceeded));
        assert!(matches!(classify("context canceled"), RenderFailure::Canceled(_)));
    }

    #[test]
    fn test_classify_other() {
        let failure = classify("net::ERR_NAME_NOT_RESOLVED");
        assert!(matches!(failure, RenderFailure::Other(_)));
        assert_eq!(failure.class(), "other");
    }

    #[test]
    fn test_policy_defaults_are_finite() {
        let policy = RenderPolicy::default();
        assert_eq!(policy.restart_wait_attempts, 5);
        assert_eq!(policy.dial_restart_threshold, 3);
        assert!(policy.dial_attempts > policy.dial_restart_threshold);
        assert_eq!(policy.restart_cooldown, Duration::from_secs(180));
        assert!(policy.timeout_attempts > 0 && policy.other_attempts > 0);
    }

    #[test]
    fn test_policy_from_config() {
        let config = AppConfig { session_timeout_ms: 90_000, restart_cooldown_secs: 60, ..Default::default() };
        let policy = RenderPolicy::from_config(&config);
        assert_eq!(policy.session_timeout, Duration::from_secs(90));
        assert_eq!(policy.settle_delay, Duration::from_millis(200));
        assert_eq!(policy.restart_cooldown, Duration::from_secs(60));
        assert!(policy.blocked_urls.iter().any(|d| d == "google-analytics.com"));
        assert_eq!(policy.headers.get("X-Prerender-Next").map(String::as_str), Some("1"));
    }
}
