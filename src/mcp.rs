use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use crate::bundle;
use sitesmith_core::{Orchestrator, SiteBundle};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CloneRequest {
    #[schemars(description = "URL, bare domain or site name to clone")]
    pub url: String,
    #[schemars(description = "Write a .zip archive instead of a directory")]
    pub zip: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct EnhanceRequest {
    #[schemars(description = "URL of the site to enhance")]
    pub site_url: String,
    #[schemars(description = "Sites to take inspiration from, in priority order")]
    pub inspiration_urls: Vec<String>,
    #[schemars(description = "What to change, e.g. 'a sticky navbar like the first site'")]
    pub query: String,
    #[schemars(description = "Write a .zip archive instead of a directory")]
    pub zip: Option<bool>,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Request problems are the caller's fault; everything else is ours.
fn err(e: sitesmith_core::Error) -> ErrorData {
    if e.is_validation() {
        ErrorData::invalid_params(e.to_string(), None::<Value>)
    } else {
        ErrorData::internal_error(e.to_string(), None::<Value>)
    }
}

fn text_ok(s: impl Into<String>) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::success(vec![Content::text(s.into())]))
}

fn summary(path: &std::path::Path, out: &SiteBundle) -> String {
    format!(
        "Bundle written to: {}\n  index.html: {} bytes\n  styles.css: {} bytes\n  script.js: {} bytes\n  assets: {}",
        path.display(),
        out.bundle.html.len(),
        out.bundle.css.len(),
        out.bundle.js.len(),
        out.assets.len()
    )
}

#[derive(Clone)]
pub struct SitesmithServer {
    orchestrator: Arc<Orchestrator>,
    output_dir: PathBuf,
    tool_router: ToolRouter<Self>,
}

impl SitesmithServer {
    fn write(&self, url: &str, out: &SiteBundle, zip: Option<bool>) -> Result<PathBuf, ErrorData> {
        let zip = zip.unwrap_or(self.orchestrator.config().output.zip);
        bundle::deliver(&self.output_dir, &bundle::project_name(url), out, zip)
            .map_err(|e| ErrorData::internal_error(format!("{:#}", e), None::<Value>))
    }
}

#[tool_router]
impl SitesmithServer {
    pub fn new(orchestrator: Arc<Orchestrator>, output_dir: PathBuf) -> Self {
        Self {
            orchestrator,
            output_dir,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Clone a web page into a static HTML/CSS/JS bundle with its same-origin assets. Accepts a URL, a bare domain or a site name."
    )]
    async fn clone_site(&self, req: Parameters<CloneRequest>) -> Result<CallToolResult, ErrorData> {
        let url = self.orchestrator.resolve_url(&req.0.url).await.map_err(err)?;
        let out = self.orchestrator.clone_site(&url).await.map_err(err)?;
        let path = self.write(&url, &out, req.0.zip)?;
        text_ok(summary(&path, &out))
    }

    #[tool(
        description = "Enhance a site using parts of other sites as inspiration, guided by a natural-language query. Writes the resulting bundle and returns its location."
    )]
    async fn enhance_site(
        &self,
        req: Parameters<EnhanceRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let req = req.0;
        let out = self
            .orchestrator
            .enhance_site(&req.inspiration_urls, &req.site_url, &req.query)
            .await
            .map_err(err)?;
        let path = self.write(&req.site_url, &out, req.zip)?;
        text_ok(summary(&path, &out))
    }
}

#[tool_handler]
impl ServerHandler for SitesmithServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sitesmith".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Website clone/enhance server. Use 'clone_site' to turn a page into a static bundle, \
                 or 'enhance_site' to merge sections of inspiration sites into your own site. \
                 Both write the bundle to the output directory, as a folder or with zip=true as a .zip, \
                 and return its path."
                    .into(),
            ),
        }
    }
}

pub async fn run_server(orchestrator: Arc<Orchestrator>, output_dir: PathBuf) -> anyhow::Result<()> {
    use rmcp::ServiceExt;

    let server = SitesmithServer::new(orchestrator, output_dir);
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let e = err(sitesmith_core::Error::InvalidRequest("query is required".into()));
        assert_eq!(e.code, ErrorCode::INVALID_PARAMS);
        assert!(e.message.contains("query is required"));

        let e = err(sitesmith_core::Error::CaptureFailure("boom".into()));
        assert_eq!(e.code, ErrorCode::INTERNAL_ERROR);
    }

    #[test]
    fn test_zip_is_optional_in_requests() {
        let req: CloneRequest = serde_json::from_str(r#"{"url": "example.com"}"#).unwrap();
        assert_eq!(req.zip, None);
        let req: EnhanceRequest = serde_json::from_str(
            r#"{"site_url": "a.test", "inspiration_urls": ["b.test"], "query": "navbar", "zip": true}"#,
        )
        .unwrap();
        assert_eq!(req.zip, Some(true));
    }
}
