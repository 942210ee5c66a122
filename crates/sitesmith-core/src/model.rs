//! Language model capability and an OpenAI-compatible chat client.

use crate::config::ModelConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Anything that turns a transcript into a text completion.
///
/// The returned text is untrusted; callers route it through [`crate::repair`].
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// Run `complete` with an upper bound on wall time.
pub async fn complete_with_timeout(
    model: &dyn LanguageModel,
    messages: &[Message],
    timeout: Duration,
) -> Result<String> {
    tokio::time::timeout(timeout, model.complete(messages))
        .await
        .map_err(|_| Error::Timeout(format!("model call exceeded {}ms", timeout.as_millis())))?
}

/// The models used by each pipeline role.
#[derive(Clone)]
pub struct ModelSet {
    /// Drives the per-chunk agent loop.
    pub agent: Arc<dyn LanguageModel>,
    /// Relevance filtering and URL lookups.
    pub filter: Arc<dyn LanguageModel>,
    /// The final correction pass.
    pub finalize: Arc<dyn LanguageModel>,
}

impl ModelSet {
    /// Use one model for every role.
    pub fn uniform(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            agent: model.clone(),
            filter: model.clone(),
            finalize: model,
        }
    }

    /// Build OpenAI-compatible clients for each role.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Ok(Self {
            agent: Arc::new(OpenAiChat::new(config, &config.agent_model)?),
            filter: Arc::new(OpenAiChat::new(config, &config.filter_model)?),
            finalize: Arc::new(OpenAiChat::new(config, &config.finalize_model)?),
        })
    }
}

/// Chat completions client for any OpenAI-compatible endpoint.
pub struct OpenAiChat {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_retries: u32,
}

impl OpenAiChat {
    pub fn new(config: &ModelConfig, model: &str) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("model.api_key is not set (try OPENAI_API_KEY)".into())
            })?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(&self.url)
                .bearer_auth(self.api_key.trim())
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        Error::Timeout(format!("{}: {}", self.model, e))
                    } else {
                        Error::TransportFailure(e.to_string())
                    }
                })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                let wait = u64::from(attempt + 1) * 5;
                warn!(model = %self.model, wait_secs = wait, "rate limited");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                attempt += 1;
                continue;
            }
            if !status.is_success() {
                let text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                return Err(Error::TransportFailure(format!(
                    "{} returned {}: {}",
                    self.model, status, text
                )));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| Error::TransportFailure(format!("bad response body: {}", e)))?;
            let content = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .unwrap_or_default();
            debug!(model = %self.model, chars = content.len(), "completion received");
            return Ok(content);
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
