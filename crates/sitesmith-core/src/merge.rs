//! Ordered accumulation of per-chunk fragments.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{html, css, js}` produced by one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub html: String,
    pub css: String,
    pub js: String,
}

impl Fragment {
    pub fn new(html: impl Into<String>, css: impl Into<String>, js: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            css: css.into(),
            js: js.into(),
        }
    }

    /// Read the three fields from a repaired object. Missing or non-string fields are empty.
    pub fn from_value(value: &Value) -> Self {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            html: field("html"),
            css: field("css"),
            js: field("js"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.css.is_empty() && self.js.is_empty()
    }
}

/// Append-only html/css/js accumulators of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiteArtifact {
    pub html: String,
    pub css: String,
    pub js: String,
}

impl SiteArtifact {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate `fragment` onto each accumulator.
    pub fn append(mut self, fragment: &Fragment) -> Self {
        self.html.push_str(&fragment.html);
        self.css.push_str(&fragment.css);
        self.js.push_str(&fragment.js);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.css.is_empty() && self.js.is_empty()
    }
}

/// Applies fragments strictly in chunk order, each exactly once.
#[derive(Debug, Default)]
pub struct ChunkMerger {
    artifact: SiteArtifact,
    next: usize,
}

impl ChunkMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the fragment for chunk `index`. Indices must arrive as 0, 1, 2, ...
    pub fn apply(&mut self, index: usize, fragment: &Fragment) -> Result<()> {
        if index != self.next {
            return Err(Error::MergeOrder {
                expected: self.next,
                got: index,
            });
        }
        self.artifact = std::mem::take(&mut self.artifact).append(fragment);
        self.next += 1;
        Ok(())
    }

    /// Number of chunks applied so far.
    pub fn applied(&self) -> usize {
        self.next
    }

    pub fn artifact(&self) -> &SiteArtifact {
        &self.artifact
    }

    pub fn into_artifact(self) -> SiteArtifact {
        self.artifact
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragments() -> Vec<Fragment> {
        vec![
            Fragment::new("<main>", "a{}", "a();"),
            Fragment::new("<p>body</p>", "", "b();"),
            Fragment::new("</main>", "c{}", ""),
        ]
    }

    #[test]
    fn test_append_in_order() {
        let f = fragments();
        let artifact = f.iter().fold(SiteArtifact::new(), |a, frag| a.append(frag));
        assert_eq!(artifact.html, "<main><p>body</p></main>");
        assert_eq!(artifact.css, "a{}c{}");
        assert_eq!(artifact.js, "a();b();");
    }

    #[test]
    fn test_merge_order_matters() {
        let f = fragments();
        let ordered = f.iter().fold(SiteArtifact::new(), |a, frag| a.append(frag));
        let swapped = [&f[1], &f[0], &f[2]]
            .into_iter()
            .fold(SiteArtifact::new(), |a, frag| a.append(frag));
        assert_ne!(ordered, swapped);
        assert_eq!(
            ordered.html,
            format!("{}{}{}", f[0].html, f[1].html, f[2].html)
        );
    }

    #[test]
    fn test_merger_rejects_out_of_order() {
        let f = fragments();
        let mut merger = ChunkMerger::new();
        merger.apply(0, &f[0]).unwrap();

        let err = merger.apply(2, &f[2]).unwrap_err();
        assert!(matches!(err, Error::MergeOrder { expected: 1, got: 2 }));

        merger.apply(1, &f[1]).unwrap();
        // replaying a chunk is rejected too
        assert!(merger.apply(1, &f[1]).is_err());

        merger.apply(2, &f[2]).unwrap();
        assert_eq!(merger.applied(), 3);
        assert_eq!(merger.into_artifact().html, "<main><p>body</p></main>");
    }

    #[test]
    fn test_empty_fragment_contributes_nothing() {
        let mut merger = ChunkMerger::new();
        merger.apply(0, &Fragment::new("a", "", "")).unwrap();
        merger.apply(1, &Fragment::default()).unwrap();
        merger.apply(2, &Fragment::new("b", "", "")).unwrap();
        assert_eq!(merger.artifact().html, "ab");
    }

    #[test]
    fn test_fragment_from_value() {
        let frag = Fragment::from_value(&json!({"html": "<p/>", "css": 3, "extra": "x"}));
        assert_eq!(frag, Fragment::new("<p/>", "", ""));
        assert!(Fragment::from_value(&json!("text")).is_empty());
    }
}
