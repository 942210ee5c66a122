//! # sitesmith
//!
//! Clone a web page into a static bundle, or enhance your own site with parts
//! of others, through a chunked LLM pipeline. Use the `sitesmith` CLI or run it
//! as an MCP server.
//!
//! The pipeline lives in [`sitesmith_core`]; page capture in [`sitesmith_capture`].

pub mod bundle;
pub mod mcp;

pub use sitesmith_capture::BrowserCapture;
pub use sitesmith_core::{Config, Orchestrator, SiteBundle};
