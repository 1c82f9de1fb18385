//! chromiumoxide-backed endpoint, allocator and sessions.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, Headers, SetBlockedUrLsParams, SetExtraHttpHeadersParams,
};
use futures_util::StreamExt;
use serde::Deserialize;
use url::Url;

use super::{Allocator, BrowsingSession, Endpoint, Launcher, RenderFailure, classify};

/// Reply of the DevTools `/json/version` discovery endpoint.
#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Resolves a remote DevTools endpoint, falling back to a local browser.
pub struct ChromiumLauncher {
    discovery_url: String,
    http: reqwest::Client,
}

impl ChromiumLauncher {
    pub fn new(discovery_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { discovery_url: discovery_url.into(), http }
    }

    async fn discover(&self) -> Result<String, reqwest::Error> {
        let info: VersionInfo = self
            .http
            .get(&self.discovery_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(info.web_socket_debugger_url)
    }

    async fn connect(ws_url: &str) -> Result<Browser, RenderFailure> {
        let (browser, handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| RenderFailure::Dial(e.to_string()))?;
        spawn_handler(handler);
        Ok(browser)
    }

    async fn launch_local() -> Result<Browser, RenderFailure> {
        let config = BrowserConfig::builder().build().map_err(|e| classify(&e))?;
        let (browser, handler) = Browser::launch(config).await.map_err(|e| classify_cdp(&e))?;
        spawn_handler(handler);
        Ok(browser)
    }
}

/// Classify a chromiumoxide error.
///
/// A closed handler channel or websocket means the browser behind the handle
/// is gone, which the renderer treats like a failed dial.
fn classify_cdp(err: &CdpError) -> RenderFailure {
    match err {
        CdpError::ChannelSendError(_) | CdpError::Ws(_) | CdpError::NoResponse => RenderFailure::Dial(err.to_string()),
        CdpError::Timeout => RenderFailure::DeadlineExceeded,
        _ => classify(&err.to_string()),
    }
}

fn spawn_handler(mut handler: chromiumoxide::Handler) {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::debug!("browser handler event error: {e}");
                break;
            }
        }
    });
}

#[async_trait::async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self) -> Result<Endpoint, RenderFailure> {
        match self.discover().await {
            Ok(ws_url) => {
                tracing::info!(endpoint = %ws_url, "connecting to remote browser");
                let browser = Self::connect(&ws_url).await?;
                Ok(Endpoint { allocator: Arc::new(ChromiumAllocator { browser }), remote: true })
            }
            Err(e) => {
                tracing::warn!(discovery_url = %self.discovery_url, error = %e, "no remote browser, launching local instance");
                let browser = Self::launch_local().await?;
                Ok(Endpoint { allocator: Arc::new(ChromiumAllocator { browser }), remote: false })
            }
        }
    }
}

/// Opens one blank tab per session.
pub struct ChromiumAllocator {
    browser: Browser,
}

#[async_trait::async_trait]
impl Allocator for ChromiumAllocator {
    async fn new_session(&self) -> Result<Box<dyn BrowsingSession>, RenderFailure> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| classify_cdp(&e))?;
        Ok(Box::new(ChromiumSession { page }))
    }
}

pub struct ChromiumSession {
    page: Page,
}

#[async_trait::async_trait]
impl BrowsingSession for ChromiumSession {
    async fn block_urls(&mut self, patterns: &[String]) -> Result<(), RenderFailure> {
        self.page
            .execute(EnableParams::default())
            .await
            .map_err(|e| classify_cdp(&e))?;
        self.page
            .execute(SetBlockedUrLsParams::new(patterns.to_vec()))
            .await
            .map_err(|e| classify_cdp(&e))?;
        Ok(())
    }

    async fn set_headers(&mut self, headers: &BTreeMap<String, String>) -> Result<(), RenderFailure> {
        let value = serde_json::to_value(headers).map_err(|e| RenderFailure::Other(e.to_string()))?;
        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(value)))
            .await
            .map_err(|e| classify_cdp(&e))?;
        Ok(())
    }

    async fn navigate(&mut self, url: &Url) -> Result<(), RenderFailure> {
        self.page
            .goto(url.as_str())
            .await
            .map_err(|e| classify_cdp(&e))?;
        Ok(())
    }

    async fn outer_html(&mut self) -> Result<String, RenderFailure> {
        let root = self
            .page
            .find_element("html")
            .await
            .map_err(|e| classify_cdp(&e))?;
        root.outer_html()
            .await
            .map_err(|e| classify_cdp(&e))?
            .ok_or_else(|| RenderFailure::NodeNotFound("document root has no outer HTML".into()))
    }

    async fn close(self: Box<Self>) {
        self.page.close().await.ok();
    }
}
