use crate::merge::Fragment;
use crate::repair::repair;
use crate::Result;
use serde_json::Value;

/// Answer of the inspiration relevance filter for one HTML chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relevance {
    pub found: bool,
    pub html: String,
    pub css: String,
    pub js: String,
}

impl Relevance {
    /// Parse a raw filter reply. `found` accepts booleans, `"true"`/`"yes"` and 1.
    pub fn parse(reply: &str) -> Result<Self> {
        Ok(Self::from_value(&repair(reply)?))
    }

    pub fn from_value(value: &Value) -> Self {
        let found = match value.get("found") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            _ => false,
        };
        let Fragment { html, css, js } = Fragment::from_value(value);
        Self {
            found,
            html,
            css,
            js,
        }
    }

    pub fn fragment(&self) -> Fragment {
        Fragment::new(self.html.as_str(), self.css.as_str(), self.js.as_str())
    }
}
