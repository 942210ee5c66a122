//! # sitesmith-core
//!
//! Chunked LLM pipeline that turns scraped website material into a static site
//! bundle. Scraped HTML/CSS/JS is split under a token budget, each chunk is
//! driven through a START/THINK/OBSERVE/OUTPUT agent loop, the per-chunk
//! fragments are merged in order, and a final correction pass tidies the result.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sitesmith_core::{Config, ModelSet, Orchestrator, PageCapture};
//!
//! # async fn run(capture: Arc<dyn PageCapture>) -> sitesmith_core::Result<()> {
//! let config = Config::load("sitesmith.yaml")?;
//! let models = ModelSet::from_config(&config.model)?;
//! let orchestrator = Orchestrator::new(models, capture, config);
//!
//! let out = orchestrator
//!     .enhance_site(
//!         &["https://inspiration.example".to_string()],
//!         "https://my.example",
//!         "navbar like the inspiration site",
//!     )
//!     .await?;
//! println!("{}", out.bundle.html);
//! # Ok(())
//! # }
//! ```

mod config;

pub mod agent;
pub mod budget;
pub mod capture;
pub mod finalize;
pub mod merge;
pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod repair;

pub use agent::{AgentLoop, AgentStep, AgentTask, StepKind, Transcript, Turn};
pub use budget::{Chunk, TokenBudgeter};
pub use capture::{CapturedPage, PageCapture, ScrapedSite};
pub use config::{
    AgentConfig, BudgetConfig, CaptureConfig, Config, ModelConfig, OutputConfig, ParamDef,
    Params, Viewport,
};
pub use finalize::{FinalBundle, FinalizationPass};
pub use merge::{ChunkMerger, Fragment, SiteArtifact};
pub use model::{LanguageModel, Message, ModelSet, OpenAiChat, Role};
pub use orchestrator::{Orchestrator, Relevance, SiteBundle};
pub use progress::{ChannelSink, NullSink, ProgressSink, TracingSink};
pub use repair::repair;

/// Result type for sitesmith operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token budget exceeded: fixed context needs {required} tokens, limit is {limit}")]
    BudgetExceeded { required: usize, limit: usize },

    #[error("unrecoverable model output: {reason}")]
    UnrecoverableFormat { reason: String, cleaned: String },

    #[error("page capture failed: {0}")]
    CaptureFailure(String),

    #[error("model transport failed: {0}")]
    TransportFailure(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("chunk merged out of order: expected {expected}, got {got}")]
    MergeOrder { expected: usize, got: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is the caller's fault (bad input) rather than a pipeline failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::Config(_))
    }
}
