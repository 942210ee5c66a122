//! Single corrective pass over the merged site.

use crate::merge::SiteArtifact;
use crate::model::{complete_with_timeout, LanguageModel, Message};
use crate::progress::ProgressSink;
use crate::repair::repair;
use crate::{prompts, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const NO_HTML: &str = "<!-- no html -->";
pub const NO_CSS: &str = "/* no css */";
pub const NO_JS: &str = "// no js";

/// Deliverable site: written as `index.html`, `styles.css` and `script.js`.
///
/// Every field is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalBundle {
    pub html: String,
    pub css: String,
    pub js: String,
}

fn or_placeholder(value: &str, placeholder: &str) -> String {
    if value.trim().is_empty() {
        placeholder.to_string()
    } else {
        value.to_string()
    }
}

impl FinalBundle {
    /// The artifact as-is, with placeholders for empty parts.
    pub fn from_artifact(artifact: &SiteArtifact) -> Self {
        Self {
            html: or_placeholder(&artifact.html, NO_HTML),
            css: or_placeholder(&artifact.css, NO_CSS),
            js: or_placeholder(&artifact.js, NO_JS),
        }
    }

    /// Fields from a repaired model reply; empty or missing ones fall back to `artifact`.
    fn merge_reply(value: &Value, artifact: &SiteArtifact) -> Self {
        let pick = |name: &str, fallback: &str, placeholder: &str| {
            let field = value.get(name).and_then(Value::as_str).unwrap_or_default();
            if field.trim().is_empty() {
                or_placeholder(fallback, placeholder)
            } else {
                field.to_string()
            }
        };
        Self {
            html: pick("html", &artifact.html, NO_HTML),
            css: pick("css", &artifact.css, NO_CSS),
            js: pick("js", &artifact.js, NO_JS),
        }
    }
}

/// Best-effort structural clean-up of the merged artifact.
pub struct FinalizationPass {
    model: Arc<dyn LanguageModel>,
    sink: Arc<dyn ProgressSink>,
    timeout: Duration,
}

impl FinalizationPass {
    pub fn new(model: Arc<dyn LanguageModel>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            model,
            sink,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Never fails: any error returns the artifact unchanged.
    pub async fn finalize(&self, artifact: &SiteArtifact, user_site: &str) -> FinalBundle {
        self.sink.emit("finalizing merged site");
        match self.request(artifact, user_site).await {
            Ok(value) => {
                info!("finalization applied");
                FinalBundle::merge_reply(&value, artifact)
            }
            Err(e) => {
                warn!(error = %e, "finalization skipped");
                self.sink
                    .emit("finalization failed, keeping merged output");
                FinalBundle::from_artifact(artifact)
            }
        }
    }

    async fn request(&self, artifact: &SiteArtifact, user_site: &str) -> Result<Value> {
        let prompt = prompts::finalize(&artifact.html, &artifact.css, &artifact.js, user_site);
        let reply =
            complete_with_timeout(self.model.as_ref(), &[Message::user(prompt)], self.timeout)
                .await?;
        repair(&reply)
    }
}
