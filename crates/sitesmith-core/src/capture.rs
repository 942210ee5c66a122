//! Page capture capability consumed by the pipeline.

use crate::budget::{escaped_size, estimate_size, truncate};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw material captured from one URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedSite {
    pub html: String,
    pub css: String,
    pub js: String,
}

impl ScrapedSite {
    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.css.is_empty() && self.js.is_empty()
    }

    /// JSON description handed to prompts as the user's site.
    pub fn to_context(&self) -> String {
        serde_json::json!({
            "html": self.html,
            "css": self.css,
            "js": self.js,
        })
        .to_string()
    }

    /// Like [`to_context`](Self::to_context), but at most `limit` tokens once
    /// embedded in a request. An oversized site keeps a prefix of its HTML and
    /// drops CSS and JS. The flag tells whether anything was cut.
    pub fn to_bounded_context(&self, limit: usize) -> (String, bool) {
        let full = self.to_context();
        if escaped_size(&full) <= limit {
            return (full, false);
        }

        let mut keep = estimate_size(&self.html);
        loop {
            let context = serde_json::json!({
                "html": truncate(&self.html, keep),
                "css": "",
                "js": "",
            })
            .to_string();
            let size = escaped_size(&context);
            if size <= limit || keep == 0 {
                return (context, true);
            }
            keep = keep * limit / size;
        }
    }
}

/// A captured page plus its same-origin assets.
#[derive(Debug, Clone, Default)]
pub struct CapturedPage {
    pub site: ScrapedSite,
    /// Local relative path (e.g. `assets/logo.png`) to bytes.
    pub assets: BTreeMap<String, Vec<u8>>,
}

/// Loads a page, triggers lazy content and returns its source and assets.
#[async_trait]
pub trait PageCapture: Send + Sync {
    /// Full capture: asset URLs in `html` are rewritten to the keys of `assets`.
    async fn capture(&self, url: &str) -> Result<CapturedPage>;

    /// Source only. Used for inspiration sites where assets are not kept.
    async fn capture_content(&self, url: &str) -> Result<ScrapedSite> {
        Ok(self.capture(url).await?.site)
    }
}
