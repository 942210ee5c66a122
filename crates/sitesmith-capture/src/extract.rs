//! In-page scripts: lazy-load scrolling and source snapshot.

use crate::assets::RawAsset;
use crate::{Error, Result};
use eoka::Page;
use serde::Deserialize;
use tracing::debug;

/// Pause between scroll steps so lazy content can load.
const SCROLL_PAUSE_MS: u64 = 400;

const SCROLL_STEP_JS: &str = r#"(() => {
    window.scrollBy(0, window.innerHeight);
    const root = document.scrollingElement || document.documentElement;
    return window.innerHeight + window.scrollY >= root.scrollHeight - 2;
})()"#;

const SNAPSHOT_JS: &str = r#"(() => {
    const css = [];
    for (const sheet of Array.from(document.styleSheets)) {
        try {
            for (const rule of Array.from(sheet.cssRules)) css.push(rule.cssText);
        } catch (e) {}
    }
    const js = Array.from(document.querySelectorAll('script:not([src])'))
        .map(s => s.textContent)
        .filter(t => t && t.trim().length > 0);
    const assets = [];
    const collect = (selector, attr) => {
        for (const el of document.querySelectorAll(selector)) {
            const raw = el.getAttribute(attr);
            const url = el[attr];
            if (!raw || !url || typeof url !== 'string' || url.startsWith('data:')) continue;
            assets.push({ raw, url });
        }
    };
    collect('img[src]', 'src');
    collect('script[src]', 'src');
    for (const link of document.querySelectorAll('link[href]')) {
        const rel = (link.getAttribute('rel') || '').toLowerCase();
        if (!rel.includes('stylesheet') && !rel.includes('icon')) continue;
        const raw = link.getAttribute('href');
        if (!raw || link.href.startsWith('data:')) continue;
        assets.push({ raw, url: link.href });
    }
    return JSON.stringify({
        html: '<!DOCTYPE html>\n' + document.documentElement.outerHTML,
        css: css.join('\n'),
        js: js.join('\n'),
        assets,
    });
})()"#;

/// Rendered page contents plus the resources it references.
#[derive(Debug, Deserialize)]
pub struct Snapshot {
    pub html: String,
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub js: String,
    #[serde(default)]
    pub assets: Vec<RawAsset>,
}

/// Scroll to the bottom one viewport at a time, then back to the top.
pub async fn auto_scroll(page: &Page, max_steps: u32) -> Result<()> {
    let mut steps = 0;
    while steps < max_steps {
        let at_bottom: bool = page.evaluate(SCROLL_STEP_JS).await?;
        page.wait(SCROLL_PAUSE_MS).await;
        steps += 1;
        if at_bottom {
            break;
        }
    }
    debug!(steps, "auto-scroll done");
    page.execute("window.scrollTo(0, 0)").await?;
    Ok(())
}

pub async fn snapshot(page: &Page) -> Result<Snapshot> {
    let json: String = page.evaluate(SNAPSHOT_JS).await?;
    if json.is_empty() || json == "null" {
        return Err(Error::Browser(eoka::Error::CdpSimple(
            "page snapshot returned nothing".into(),
        )));
    }
    Ok(serde_json::from_str(&json)?)
}
