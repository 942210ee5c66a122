//! # sitesmith-capture
//!
//! Headless Chrome implementation of [`sitesmith_core::PageCapture`].
//!
//! A capture navigates to the page, scrolls it to trigger lazy loading,
//! snapshots the rendered HTML, stylesheet rules and inline scripts, then
//! downloads same-origin images, scripts and stylesheets and points the HTML
//! at the local copies.
//!
//! ```rust,no_run
//! use sitesmith_capture::BrowserCapture;
//! use sitesmith_core::{CaptureConfig, PageCapture};
//!
//! # async fn run() -> sitesmith_core::Result<()> {
//! let capture = BrowserCapture::new(CaptureConfig::default())?;
//! let page = capture.capture("https://example.com").await?;
//! println!("{} bytes of html, {} assets", page.site.html.len(), page.assets.len());
//! capture.close().await;
//! # Ok(())
//! # }
//! ```

pub mod assets;
pub mod extract;

use async_trait::async_trait;
use eoka::{Browser, StealthConfig};
use sitesmith_core::{CaptureConfig, CapturedPage, PageCapture, ScrapedSite};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("bad page snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<Error> for sitesmith_core::Error {
    fn from(e: Error) -> Self {
        sitesmith_core::Error::CaptureFailure(e.to_string())
    }
}

/// Captures pages with one shared, lazily launched browser; one tab per capture.
pub struct BrowserCapture {
    config: CaptureConfig,
    browser: Mutex<Option<Browser>>,
    http: reqwest::Client,
}

impl BrowserCapture {
    pub fn new(config: CaptureConfig) -> Result<Self> {
        let mut http = reqwest::Client::builder().timeout(config.asset_timeout());
        if let Some(ref ua) = config.user_agent {
            http = http.user_agent(ua.clone());
        }
        Ok(Self {
            http: http.build()?,
            config,
            browser: Mutex::new(None),
        })
    }

    fn stealth_config(&self) -> StealthConfig {
        StealthConfig {
            headless: self.config.headless,
            proxy: self.config.proxy.clone(),
            user_agent: self.config.user_agent.clone(),
            viewport_width: self
                .config
                .viewport
                .as_ref()
                .map(|v| v.width)
                .unwrap_or(1920),
            viewport_height: self
                .config
                .viewport
                .as_ref()
                .map(|v| v.height)
                .unwrap_or(1080),
            ..Default::default()
        }
    }

    /// Capture `url`; asset downloads are skipped when `with_assets` is false.
    pub async fn capture_page(&self, url: &str, with_assets: bool) -> Result<CapturedPage> {
        let base = Url::parse(url)?;

        let mut guard = self.browser.lock().await;
        if guard.is_none() {
            debug!(
                "Launching browser (headless: {}, proxy: {:?})",
                self.config.headless, self.config.proxy
            );
            *guard = Some(Browser::launch_with_config(self.stealth_config()).await?);
        }
        let browser = guard
            .as_ref()
            .ok_or_else(|| eoka::Error::CdpSimple("browser not running".into()))?;

        // navigation runs inside the block below so a hung page still has its tab closed
        let page = browser.new_page("about:blank").await?;
        let tab = page.target_id().to_string();

        let result = async {
            tokio::time::timeout(self.config.navigation_timeout(), page.goto(url))
                .await
                .map_err(|_| Error::Timeout(format!("navigating to {}", url)))??;
            let _ = page.wait_for_network_idle(500, 10_000).await;
            extract::auto_scroll(&page, self.config.max_scrolls).await?;
            extract::snapshot(&page).await
        }
        .await;

        if let Err(e) = browser.close_tab(&tab).await {
            debug!(tab = %tab, error = %e, "closing tab failed");
        }
        drop(guard);

        let snapshot = result?;
        let mut site = ScrapedSite {
            html: snapshot.html,
            css: snapshot.css,
            js: snapshot.js,
        };
        let mut files = BTreeMap::new();

        if with_assets {
            for asset in assets::plan(&base, &snapshot.assets) {
                match self.download(&asset.url).await {
                    Ok(bytes) => {
                        site.html = assets::rewrite(&site.html, &asset);
                        files.insert(asset.local, bytes);
                    }
                    Err(e) => warn!(url = %asset.url, error = %e, "asset download failed"),
                }
            }
        }

        info!(
            url,
            html = site.html.len(),
            assets = files.len(),
            "page captured"
        );
        Ok(CapturedPage {
            site,
            assets: files,
        })
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Shut the browser down if it was launched.
    pub async fn close(&self) {
        if let Some(browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                debug!(error = %e, "browser close failed");
            }
        }
    }
}

#[async_trait]
impl PageCapture for BrowserCapture {
    async fn capture(&self, url: &str) -> sitesmith_core::Result<CapturedPage> {
        Ok(self.capture_page(url, true).await?)
    }

    async fn capture_content(&self, url: &str) -> sitesmith_core::Result<ScrapedSite> {
        Ok(self.capture_page(url, false).await?.site)
    }
}
