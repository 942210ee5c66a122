use super::Orchestrator;
use crate::model::{complete_with_timeout, Message};
use crate::repair::repair;
use crate::{prompts, Error, Result};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.host_str().is_some()
}

/// Resolve without a model: full http(s) URLs as-is, bare hosts get `https://`.
///
/// Returns `None` for input that looks like a keyword.
pub fn normalize_url(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() || input.chars().any(char::is_whitespace) {
        return None;
    }
    if let Ok(url) = Url::parse(input) {
        if is_http(&url) {
            return Some(input.to_string());
        }
    }
    let prefixed = format!("https://{}", input);
    match Url::parse(&prefixed) {
        Ok(url) if is_http(&url) && url.host_str().is_some_and(|h| h.contains('.')) => {
            Some(prefixed)
        }
        _ => None,
    }
}

impl Orchestrator {
    /// Turn user input (URL, bare host or keyword) into a fetchable URL.
    pub async fn resolve_url(&self, input: &str) -> Result<String> {
        if input.trim().is_empty() {
            return Err(Error::InvalidRequest("url is required".into()));
        }
        if let Some(url) = normalize_url(input) {
            debug!(%url, "url used as given");
            return Ok(url);
        }

        self.sink
            .emit(&format!("looking up the homepage for '{}'", input.trim()));
        let prompt = prompts::resolve_url(input.trim());
        let reply = complete_with_timeout(
            self.models.filter.as_ref(),
            &[Message::user(prompt)],
            self.config.model.timeout(),
        )
        .await?;
        let value = repair(&reply)?;
        let candidate = value.get("url").and_then(Value::as_str).unwrap_or_default();

        match normalize_url(candidate) {
            Some(url) => {
                info!(input = input.trim(), %url, "resolved url");
                Ok(url)
            }
            None => Err(Error::InvalidRequest(format!(
                "could not resolve '{}' to a URL",
                input.trim()
            ))),
        }
    }
}
