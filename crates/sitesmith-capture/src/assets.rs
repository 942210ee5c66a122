//! Same-origin asset selection, local naming and URL rewriting.

use serde::Deserialize;
use std::collections::HashSet;
use url::Url;

/// Asset reference as found in the DOM.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAsset {
    /// Attribute value as written in the markup.
    pub raw: String,
    /// Resolved by the browser.
    pub url: String,
}

/// An asset that will be downloaded and referenced locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAsset {
    pub raw: String,
    pub url: Url,
    /// Relative path inside the bundle, e.g. `assets/logo.png`.
    pub local: String,
}

pub fn same_origin(base: &Url, url: &Url) -> bool {
    base.origin() == url.origin()
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "asset".to_string()
    } else {
        cleaned
    }
}

/// `name.ext` -> `name-2.ext` until unused.
fn unique_name(name: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.clone()) {
        return name;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{}", ext)),
        _ => (name.clone(), String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}{}", stem, n, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Pick the same-origin http(s) assets worth downloading, each once, with unique local names.
pub fn plan(base: &Url, found: &[RawAsset]) -> Vec<PlannedAsset> {
    let mut seen_urls = HashSet::new();
    let mut taken = HashSet::new();
    let mut planned = Vec::new();

    for asset in found {
        let Ok(mut url) = base.join(&asset.url) else {
            continue;
        };
        url.set_fragment(None);
        if !matches!(url.scheme(), "http" | "https") || !same_origin(base, &url) {
            continue;
        }
        if !seen_urls.insert(url.to_string()) {
            continue;
        }

        // a path ending in `/` names a page or directory, not a file
        let Some(file) = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
        else {
            continue;
        };
        let name = unique_name(sanitize(file), &mut taken);
        planned.push(PlannedAsset {
            raw: asset.raw.clone(),
            url,
            local: format!("assets/{}", name),
        });
    }
    planned
}

/// Point references to `asset` in `html` at its local copy.
pub fn rewrite(html: &str, asset: &PlannedAsset) -> String {
    let local = format!("./{}", asset.local);
    let mut out = html.to_string();

    let mut forms = vec![asset.raw.clone()];
    let escaped = asset.raw.replace('&', "&amp;");
    if escaped != asset.raw {
        forms.push(escaped);
    }
    for form in forms.iter().filter(|f| !f.is_empty()) {
        for quote in ['"', '\''] {
            out = out.replace(
                &format!("{q}{form}{q}", q = quote),
                &format!("{q}{local}{q}", q = quote),
            );
        }
    }

    // absolute references, e.g. in srcset or inline styles
    let absolute = asset.url.as_str();
    out = replace_whole(&out, absolute, &local);
    let escaped = absolute.replace('&', "&amp;");
    if escaped != absolute {
        out = replace_whole(&out, &escaped, &local);
    }
    out
}

/// Replace `url` where it is a complete reference, not the prefix of a longer URL.
fn replace_whole(text: &str, url: &str, with: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (at, _) in text.match_indices(url) {
        let end = at + url.len();
        let ends_here = text[end..].chars().next().map_or(true, |c| {
            c.is_whitespace() || matches!(c, '"' | '\'' | ')' | ',' | '<' | '>')
        });
        if ends_here {
            out.push_str(&text[last..at]);
            out.push_str(with);
            last = end;
        }
    }
    out.push_str(&text[last..]);
    out
}
