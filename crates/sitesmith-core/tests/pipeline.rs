//! End-to-end pipeline runs against scripted models and an in-memory capture.

use async_trait::async_trait;
use sitesmith_core::budget::{combine, estimate_size};
use sitesmith_core::{
    CapturedPage, ChannelSink, Config, Error, LanguageModel, Message, ModelSet, Orchestrator,
    PageCapture, Result, ScrapedSite,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Agent model: one THINK step per chunk, then OUTPUT `<cN>`; corrections echo the payload.
#[derive(Default)]
struct AgentModel {
    /// Chunk whose opening reply is garbage.
    fail_chunk: Option<usize>,
    chunks: Mutex<Vec<String>>,
    /// System and user text of every opening request.
    openings: Mutex<Vec<(String, String)>>,
    transcript_lens: Mutex<Vec<usize>>,
    last_payload: Mutex<String>,
}

impl AgentModel {
    fn failing(chunk: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_chunk: Some(chunk),
            ..Default::default()
        })
    }

    fn chunks(&self) -> Vec<String> {
        self.chunks.lock().unwrap().clone()
    }

    /// Every opening request fits the configured budget minus the margin.
    fn assert_openings_fit(&self, config: &Config) {
        let limit = config.budget.max_tokens_per_request - config.budget.safety_margin;
        for (system, user) in self.openings.lock().unwrap().iter() {
            let size = estimate_size(system) + estimate_size(user);
            assert!(size <= limit, "request of {size} tokens over {limit}");
        }
    }
}

#[async_trait]
impl LanguageModel for AgentModel {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.transcript_lens.lock().unwrap().push(messages.len());
        match messages.len() {
            // correction call
            1 => Ok(self.last_payload.lock().unwrap().clone()),
            2 => {
                self.openings
                    .lock()
                    .unwrap()
                    .push((messages[0].content.clone(), messages[1].content.clone()));
                let user: serde_json::Value = serde_json::from_str(&messages[1].content).unwrap();
                let mut chunks = self.chunks.lock().unwrap();
                chunks.push(user["chunk"].as_str().unwrap().to_string());
                if self.fail_chunk == Some(chunks.len() - 1) {
                    return Ok("Sorry, that is too much code for me.".into());
                }
                Ok(r#"{"step": "THINK", "content": "reading the chunk"}"#.into())
            }
            _ => {
                let n = self.chunks.lock().unwrap().len() - 1;
                let payload = format!(r#"{{"html": "<c{n}>", "css": ".c{n}{{}}", "js": ""}}"#);
                *self.last_payload.lock().unwrap() = payload.clone();
                Ok(format!(r#"{{"step": "OUTPUT", "content": {payload}}}"#))
            }
        }
    }
}

/// Relevance filter: marks a chunk found when it contains `needle`.
struct FilterModel {
    needle: &'static str,
    prompts: Mutex<Vec<String>>,
}

impl FilterModel {
    fn new(needle: &'static str) -> Arc<Self> {
        Arc::new(Self {
            needle,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for FilterModel {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let prompt = messages[0].content.clone();
        let found = prompt.contains(self.needle);
        self.prompts.lock().unwrap().push(prompt);
        if found {
            Ok(r#"{found: true, html: "<nav>A</nav>", css: "", js: ""}"#.into())
        } else {
            Ok(r#"{"found": false, "html": "", "css": "", "js": ""}"#.into())
        }
    }
}

/// Relevance filter that hands back every chunk it sees, never marking it found.
struct EchoFilter;

#[async_trait]
impl LanguageModel for EchoFilter {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let prompt = &messages[0].content;
        let chunk = prompt.split_once("Chunk:\n").map_or("", |(_, c)| c);
        Ok(serde_json::json!({"found": false, "html": chunk, "css": "", "js": ""}).to_string())
    }
}

struct Fixed(&'static str);

#[async_trait]
impl LanguageModel for Fixed {
    async fn complete(&self, _messages: &[Message]) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// In-memory pages; unknown URLs fail like a navigation error.
#[derive(Default)]
struct Pages(HashMap<&'static str, CapturedPage>);

impl Pages {
    fn with(mut self, url: &'static str, html: &str, assets: &[(&str, &[u8])]) -> Self {
        self.0.insert(
            url,
            CapturedPage {
                site: ScrapedSite {
                    html: html.to_string(),
                    css: String::new(),
                    js: String::new(),
                },
                assets: assets
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_vec()))
                    .collect(),
            },
        );
        self
    }
}

#[async_trait]
impl PageCapture for Pages {
    async fn capture(&self, url: &str) -> Result<CapturedPage> {
        self.0
            .get(url)
            .cloned()
            .ok_or_else(|| Error::CaptureFailure(format!("navigation to {url} failed")))
    }
}

fn config(yaml_budget: &str) -> Config {
    Config::parse(&format!("name: test\n{yaml_budget}")).unwrap()
}

#[tokio::test]
async fn test_clone_skips_unparsable_chunk() {
    let html = "<p>".repeat(400);
    let config = config("budget:\n  max_tokens_per_request: 1000\n  safety_margin: 200\n");

    let agent = AgentModel::failing(1);
    let models = ModelSet {
        agent: agent.clone(),
        filter: Arc::new(Fixed("{}")),
        finalize: Arc::new(Fixed("not json at all")),
    };
    let capture = Arc::new(Pages::default().with(
        "https://site.test",
        &html,
        &[("assets/logo.png", &b"png"[..])],
    ));

    let out = Orchestrator::new(models, capture, config.clone())
        .clone_site("https://site.test")
        .await
        .unwrap();

    let chunks = agent.chunks();
    let n = chunks.len();
    assert!(n >= 3, "got {n} chunks");
    assert_eq!(chunks.concat(), combine(&html, "", ""));
    agent.assert_openings_fit(&config);

    // finalization reply is unusable, so the merged artifact comes back as-is
    let kept: Vec<usize> = (0..n).filter(|&i| i != 1).collect();
    let expected_html: String = kept.iter().map(|i| format!("<c{i}>")).collect();
    let expected_css: String = kept.iter().map(|i| format!(".c{i}{{}}")).collect();
    assert_eq!(out.bundle.html, expected_html);
    assert_eq!(out.bundle.css, expected_css);
    assert_eq!(out.bundle.js, "// no js");
    assert_eq!(out.assets.get("assets/logo.png").map(Vec::as_slice), Some(&b"png"[..]));

    // open, THINK, correction per chunk; chunk 1 is aborted after opening
    let expected_lens: Vec<usize> = (0..n)
        .flat_map(|i| if i == 1 { vec![2] } else { vec![2, 3, 1] })
        .collect();
    assert_eq!(*agent.transcript_lens.lock().unwrap(), expected_lens);
}

#[tokio::test]
async fn test_requests_fit_budget_with_escaped_chunks() {
    // quotes and newlines grow once the chunk is embedded in JSON
    let html = "<a href=\"/p\">\n\t\"x\"\n</a>\n".repeat(300);
    let config = config("budget:\n  max_tokens_per_request: 1200\n  safety_margin: 100\n");
    let agent = Arc::new(AgentModel::default());
    let models = ModelSet {
        agent: agent.clone(),
        filter: Arc::new(Fixed("{}")),
        finalize: Arc::new(Fixed("{}")),
    };
    let capture = Arc::new(Pages::default().with("https://site.test", &html, &[]));

    Orchestrator::new(models, capture, config.clone())
        .clone_site("https://site.test")
        .await
        .unwrap();

    assert!(agent.chunks().len() > 1);
    agent.assert_openings_fit(&config);
}

#[tokio::test]
async fn test_enhance_requests_fit_default_budget() {
    let user_html: String = (0..60)
        .map(|i| format!("<a href=\"/page/{i}\" class=\"nav-link\">Page {i}</a>\n"))
        .collect();
    let inspiration: String = (0..2000)
        .map(|i| format!("<a href=\"/item/{i}\" class=\"card\">Item {i}</a>\n"))
        .collect();
    let config = config("");
    let agent = Arc::new(AgentModel::default());
    let models = ModelSet {
        agent: agent.clone(),
        filter: Arc::new(EchoFilter),
        finalize: Arc::new(Fixed("{}")),
    };
    let capture = Arc::new(
        Pages::default()
            .with("https://a.test", &inspiration, &[])
            .with("https://me.test", &user_html, &[]),
    );

    Orchestrator::new(models, capture, config.clone())
        .enhance_site(&["https://a.test".to_string()], "https://me.test", "cards")
        .await
        .unwrap();

    assert!(agent.chunks().len() > 1);
    assert!(agent.chunks().concat().contains("Item 1999"));
    agent.assert_openings_fit(&config);
}

#[tokio::test]
async fn test_enhance_with_large_user_site() {
    let user_html =
        "<section class=\"card\"><h2>Plan</h2><p>Lots of detail about this plan.</p></section>\n"
            .repeat(320);
    assert!(user_html.len() > 25_000);
    let config = config("");
    let agent = Arc::new(AgentModel::default());
    let models = ModelSet {
        agent: agent.clone(),
        filter: FilterModel::new("nav"),
        finalize: Arc::new(Fixed("{}")),
    };
    let capture = Arc::new(
        Pages::default()
            .with("https://a.test", "<nav>A</nav>", &[])
            .with("https://me.test", &user_html, &[]),
    );
    let (sink, mut events) = ChannelSink::new();

    let out = Orchestrator::new(models, capture, config.clone())
        .with_sink(Arc::new(sink))
        .enhance_site(&["https://a.test".to_string()], "https://me.test", "navbar")
        .await
        .unwrap();

    assert_eq!(out.bundle.html, "<c0>");
    assert_eq!(agent.chunks().len(), 1);
    agent.assert_openings_fit(&config);

    let openings = agent.openings.lock().unwrap();
    let user: serde_json::Value = serde_json::from_str(&openings[0].1).unwrap();
    let site: serde_json::Value =
        serde_json::from_str(user["userSite"].as_str().unwrap()).unwrap();
    let sent = site["html"].as_str().unwrap();
    assert!(!sent.is_empty());
    assert!(sent.len() < user_html.len());
    assert!(user_html.starts_with(sent));

    let mut seen = Vec::new();
    while let Ok(e) = events.try_recv() {
        seen.push(e);
    }
    assert!(seen.iter().any(|e| e.contains("only the start of its HTML")));
}

#[tokio::test]
async fn test_enhance_stops_site_scan_after_first_relevant_chunk() {
    let config = config("budget:\n  relevance_chunk_chars: 10\n");
    let filter = FilterModel::new("aaaaaaaaaa");
    let agent = Arc::new(AgentModel::default());
    let models = ModelSet {
        agent: agent.clone(),
        filter: filter.clone(),
        finalize: Arc::new(Fixed(
            r#"{"html": "<!DOCTYPE html><c0>", "css": "", "js": "go();"}"#,
        )),
    };
    let capture = Arc::new(
        Pages::default()
            .with("https://a.test", "aaaaaaaaaabbbbbbbbbbcccccccccc", &[])
            .with("https://b.test", "xxxxxxxxxxyyyyyyyyyy", &[])
            .with("https://me.test", "<h1>Me</h1>", &[("assets/me.jpg", &b"jpg"[..])]),
    );
    let (sink, mut events) = ChannelSink::new();

    let out = Orchestrator::new(models, capture, config)
        .with_sink(Arc::new(sink))
        .enhance_site(
            &["https://a.test".to_string(), "https://b.test".to_string()],
            "https://me.test",
            "navbar like site a",
        )
        .await
        .unwrap();

    let calls = filter.calls();
    assert_eq!(calls.len(), 3, "site a: 1 chunk, site b: 2 chunks");
    assert!(calls[0].contains("aaaaaaaaaa"));
    assert!(calls.iter().all(|c| !c.contains("bbbbbbbbbb")));
    assert!(calls[1].contains("xxxxxxxxxx"));
    assert!(calls[2].contains("yyyyyyyyyy"));

    // collected inspiration is what the agent loop works on
    let chunks = agent.chunks();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].contains("<nav>A</nav>"));

    assert_eq!(out.bundle.html, "<!DOCTYPE html><c0>");
    assert_eq!(out.bundle.css, ".c0{}");
    assert_eq!(out.bundle.js, "go();");
    assert!(out.assets.contains_key("assets/me.jpg"));

    let mut seen = Vec::new();
    while let Ok(e) = events.try_recv() {
        seen.push(e);
    }
    assert!(seen.iter().any(|e| e.contains("found relevant content in https://a.test")));
    assert!(seen.iter().any(|e| e.contains("no relevant content found in https://b.test")));
}

#[tokio::test]
async fn test_enhance_survives_capture_failures() {
    let agent = Arc::new(AgentModel::default());
    let models = ModelSet {
        agent: agent.clone(),
        filter: FilterModel::new("never"),
        finalize: Arc::new(Fixed("garbage")),
    };
    // no pages at all: every site and the user site fail
    let out = Orchestrator::new(models, Arc::new(Pages::default()), config(""))
        .enhance_site(
            &["https://down.test".to_string()],
            "https://me.test",
            "hero section",
        )
        .await
        .unwrap();

    assert_eq!(agent.chunks(), vec![combine("", "", "")]);
    assert_eq!(out.bundle.html, "<c0>");
    assert!(out.assets.is_empty());
}

#[tokio::test]
async fn test_enhance_validation() {
    let orchestrator = Orchestrator::new(
        ModelSet::uniform(Arc::new(Fixed("{}"))),
        Arc::new(Pages::default()),
        config(""),
    );
    let urls = vec!["https://a.test".to_string()];

    let err = orchestrator
        .enhance_site(&urls, "https://me.test", "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));

    let err = orchestrator
        .enhance_site(&[], "https://me.test", "navbar")
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = orchestrator.enhance_site(&urls, "", "navbar").await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_clone_capture_failure_is_fatal() {
    let orchestrator = Orchestrator::new(
        ModelSet::uniform(Arc::new(Fixed("{}"))),
        Arc::new(Pages::default()),
        config(""),
    );
    let err = orchestrator.clone_site("https://gone.test").await.unwrap_err();
    assert!(matches!(err, Error::CaptureFailure(_)));
    assert!(!err.is_validation());
}

#[tokio::test]
async fn test_budget_exceeded_reaches_caller() {
    let config = config("budget:\n  max_tokens_per_request: 900\n  safety_margin: 850\n");
    let capture = Arc::new(Pages::default().with("https://a.test", "<p>x</p>", &[]).with(
        "https://me.test",
        &"<section>lots of text</section>".repeat(50),
        &[],
    ));
    let err = Orchestrator::new(ModelSet::uniform(Arc::new(Fixed("{}"))), capture, config)
        .enhance_site(&["https://a.test".to_string()], "https://me.test", "footer")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BudgetExceeded { .. }));
}

#[tokio::test]
async fn test_resolve_url() {
    let orchestrator = Orchestrator::new(
        ModelSet::uniform(Arc::new(Fixed(
            "```json\n{\"url\": \"https://www.lenovo.com\"}\n```",
        ))),
        Arc::new(Pages::default()),
        config(""),
    );
    assert_eq!(
        orchestrator.resolve_url("example.org").await.unwrap(),
        "https://example.org"
    );
    assert_eq!(
        orchestrator.resolve_url("lenovo").await.unwrap(),
        "https://www.lenovo.com"
    );
    assert!(orchestrator.resolve_url(" ").await.unwrap_err().is_validation());
}
