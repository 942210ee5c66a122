//! Top-level pipelines: clone one site, or enhance a site with inspiration.
//!
//! Everything runs sequentially. Chunks are merged in index order and
//! inspiration sites in input order; a failed chunk or site contributes
//! nothing instead of failing the run.

mod relevance;
mod resolve;

pub use relevance::Relevance;
pub use resolve::normalize_url;

use crate::agent::{AgentLoop, AgentTask};
use crate::budget::{chunk_chars, TokenBudgeter};
use crate::capture::{CapturedPage, PageCapture, ScrapedSite};
use crate::config::Config;
use crate::finalize::{FinalBundle, FinalizationPass};
use crate::merge::{ChunkMerger, Fragment, SiteArtifact};
use crate::model::{complete_with_timeout, Message, ModelSet};
use crate::progress::{ProgressSink, TracingSink};
use crate::{prompts, Error, Result};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the packaging layer receives.
#[derive(Debug, Clone)]
pub struct SiteBundle {
    pub bundle: FinalBundle,
    /// Local relative path to bytes, referenced from `bundle.html`.
    pub assets: BTreeMap<String, Vec<u8>>,
}

/// Query used for the clone pipeline, which has no user request.
const CLONE_QUERY: &str = "Clone this page as a clean static site.";

pub struct Orchestrator {
    models: ModelSet,
    capture: Arc<dyn PageCapture>,
    config: Config,
    sink: Arc<dyn ProgressSink>,
}

impl Orchestrator {
    pub fn new(models: ModelSet, capture: Arc<dyn PageCapture>, config: Config) -> Self {
        Self {
            models,
            capture,
            config,
            sink: Arc::new(TracingSink),
        }
    }

    /// Report progress to `sink` instead of the log.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Clone a single page into a static bundle. A failed capture is fatal.
    pub async fn clone_site(&self, url: &str) -> Result<SiteBundle> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidRequest("url is required".into()));
        }

        self.sink.emit(&format!("capturing {}", url));
        let page = self.capture_page(url).await.map_err(|e| match e {
            Error::CaptureFailure(_) => e,
            other => Error::CaptureFailure(other.to_string()),
        })?;
        info!(
            url,
            html = page.site.html.len(),
            css = page.site.css.len(),
            js = page.site.js.len(),
            assets = page.assets.len(),
            "captured page"
        );

        let context = json!({ "url": url }).to_string();
        let artifact = self
            .run_chunks(AgentTask::Clone, &page.site, CLONE_QUERY, &context)
            .await?;
        let bundle = self.finalizer().finalize(&artifact, &context).await;
        self.sink.emit("clone finished");

        Ok(SiteBundle {
            bundle,
            assets: page.assets,
        })
    }

    /// Merge inspiration from `urls` into the site at `user_url`, guided by `query`.
    pub async fn enhance_site(
        &self,
        urls: &[String],
        user_url: &str,
        query: &str,
    ) -> Result<SiteBundle> {
        let query = query.trim();
        let user_url = user_url.trim();
        if query.is_empty() {
            return Err(Error::InvalidRequest("query is required".into()));
        }
        if user_url.is_empty() {
            return Err(Error::InvalidRequest("site url is required".into()));
        }
        if urls.iter().all(|u| u.trim().is_empty()) {
            return Err(Error::InvalidRequest(
                "at least one inspiration url is required".into(),
            ));
        }

        let mut inspiration = SiteArtifact::new();
        for url in urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
            match self.collect_inspiration(url, query).await {
                Ok(fragment) => inspiration = inspiration.append(&fragment),
                Err(e) => {
                    warn!(url, error = %e, "skipping inspiration site");
                    self.sink.emit(&format!("skipping {}: {}", url, e));
                }
            }
        }

        self.sink.emit(&format!("capturing your site {}", user_url));
        let page = match self.capture_page(user_url).await {
            Ok(page) => page,
            Err(e) => {
                warn!(url = user_url, error = %e, "user site capture failed, continuing empty");
                self.sink
                    .emit("could not capture your site, continuing without it");
                CapturedPage::default()
            }
        };

        let limit = self.config.budget.user_site_limit();
        let (user_site, truncated) = page.site.to_bounded_context(limit);
        if truncated {
            warn!(
                url = user_url,
                html = page.site.html.len(),
                limit,
                "user site too large, sending a shortened copy"
            );
            self.sink
                .emit("your site is large; only the start of its HTML is sent to the model");
        }
        let combined = ScrapedSite {
            html: inspiration.html,
            css: inspiration.css,
            js: inspiration.js,
        };
        let artifact = self
            .run_chunks(AgentTask::Enhance, &combined, query, &user_site)
            .await?;
        let bundle = self.finalizer().finalize(&artifact, &user_site).await;
        self.sink.emit("enhancement finished");

        Ok(SiteBundle {
            bundle,
            assets: page.assets,
        })
    }

    /// Scan one inspiration site chunk by chunk, stopping at the first relevant chunk.
    async fn collect_inspiration(&self, url: &str, query: &str) -> Result<Fragment> {
        self.sink.emit(&format!("scanning {}", url));
        let site = tokio::time::timeout(
            self.config.capture.total_timeout(),
            self.capture.capture_content(url),
        )
        .await
        .map_err(|_| Error::Timeout(format!("capturing {}", url)))??;

        let chunks = chunk_chars(&site.html, self.config.budget.relevance_chunk_chars);
        debug!(url, chunks = chunks.len(), "relevance scan");

        let mut collected = SiteArtifact::new();
        for (i, chunk) in chunks.iter().enumerate() {
            match self.check_relevance(chunk, query).await {
                Ok(relevance) => {
                    collected = collected.append(&relevance.fragment());
                    if relevance.found {
                        self.sink
                            .emit(&format!("found relevant content in {} (chunk {})", url, i));
                        break;
                    }
                }
                Err(e) => warn!(url, chunk = i, error = %e, "relevance check failed"),
            }
        }

        if collected.is_empty() {
            self.sink
                .emit(&format!("no relevant content found in {}", url));
        }
        Ok(Fragment::new(collected.html, collected.css, collected.js))
    }

    async fn check_relevance(&self, chunk: &str, query: &str) -> Result<Relevance> {
        let reply = complete_with_timeout(
            self.models.filter.as_ref(),
            &[Message::user(prompts::relevance(chunk, query))],
            self.config.model.timeout(),
        )
        .await?;
        Relevance::parse(&reply)
    }

    /// Budgeted split, agent loop per chunk, ordered merge.
    async fn run_chunks(
        &self,
        task: AgentTask,
        source: &ScrapedSite,
        query: &str,
        user_site: &str,
    ) -> Result<SiteArtifact> {
        let context = prompts::fixed_context(task == AgentTask::Clone, query, user_site);
        let chunks = TokenBudgeter::from_config(&self.config.budget).split(
            &source.html,
            &source.css,
            &source.js,
            &context,
        )?;
        self.sink
            .emit(&format!("processing {} chunk(s)", chunks.len()));

        let agent = AgentLoop::new(self.models.agent.clone(), self.sink.clone(), task)
            .with_max_turns(self.config.agent.max_turns)
            .with_timeout(self.config.model.timeout());

        let mut merger = ChunkMerger::new();
        for chunk in &chunks {
            let fragment = agent.run(chunk, query, user_site).await;
            merger.apply(chunk.index, &fragment)?;
        }
        Ok(merger.into_artifact())
    }

    fn finalizer(&self) -> FinalizationPass {
        FinalizationPass::new(self.models.finalize.clone(), self.sink.clone())
            .with_timeout(self.config.model.timeout())
    }

    async fn capture_page(&self, url: &str) -> Result<CapturedPage> {
        tokio::time::timeout(self.config.capture.total_timeout(), self.capture.capture(url))
            .await
            .map_err(|_| Error::Timeout(format!("capturing {}", url)))?
    }
}
