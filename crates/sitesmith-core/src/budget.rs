//! Token budgeting: size estimation and bounded splitting of scraped text.
//!
//! Sizes are counted with a small deterministic pre-tokenizer rather than a
//! model vocabulary. Its pieces are contiguous slices of the input, so windows
//! of pieces always concatenate back to the original text.
//!
//! Chunk text travels inside a JSON string, so windows are measured by the
//! size of their escaped form.

use crate::config::BudgetConfig;
use crate::{Error, Result};

/// Longest run of letters counted as one piece.
const MAX_WORD: usize = 6;
/// Longest run of digits counted as one piece.
const MAX_DIGITS: usize = 3;

/// A bounded slice of the combined source buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based position; chunks must be merged in this order.
    pub index: usize,
    pub text: String,
}

/// Byte offsets where each piece starts, followed by `text.len()`.
fn boundaries(text: &str) -> Vec<usize> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let is_alpha_at = |i: usize| chars.get(i).is_some_and(|&(_, c)| c.is_alphabetic());

    let mut bounds = Vec::with_capacity(chars.len() / 3 + 1);
    let mut i = 0;
    while i < chars.len() {
        let (start, c) = chars[i];
        bounds.push(start);

        let mut j = i + 1;
        if c.is_alphabetic() || (c == ' ' && is_alpha_at(i + 1)) {
            let word_start = if c == ' ' { i + 1 } else { i };
            j = word_start;
            while j < chars.len() && j - word_start < MAX_WORD && is_alpha_at(j) {
                j += 1;
            }
        } else if c.is_ascii_digit() {
            while j < chars.len() && j - i < MAX_DIGITS && chars[j].1.is_ascii_digit() {
                j += 1;
            }
        } else if c.is_whitespace() {
            while j < chars.len() && chars[j].1.is_whitespace() {
                // a single space before a word belongs to the word
                if chars[j].1 == ' ' && is_alpha_at(j + 1) {
                    break;
                }
                j += 1;
            }
        }
        i = j;
    }
    bounds.push(text.len());
    bounds
}

/// Split text into pre-tokenizer pieces.
pub fn pieces(text: &str) -> Vec<&str> {
    boundaries(text)
        .windows(2)
        .map(|w| &text[w[0]..w[1]])
        .collect()
}

/// Estimated token count of `text`.
pub fn estimate_size(text: &str) -> usize {
    boundaries(text).len() - 1
}

/// `text` as it appears inside a JSON string literal, without the quotes.
pub fn json_escape(text: &str) -> String {
    match serde_json::to_string(text) {
        Ok(quoted) => quoted[1..quoted.len() - 1].to_string(),
        Err(_) => text.to_string(),
    }
}

/// Estimated token count of `text` once embedded in a JSON string.
pub fn escaped_size(text: &str) -> usize {
    estimate_size(&json_escape(text))
}

fn piece_cost(piece: &str) -> usize {
    if piece.chars().any(|c| c == '"' || c == '\\' || c.is_control()) {
        escaped_size(piece).max(1)
    } else {
        1
    }
}

/// The longest prefix of `text` made of at most `max_pieces` pieces.
pub fn truncate(text: &str, max_pieces: usize) -> &str {
    let bounds = boundaries(text);
    &text[..bounds[max_pieces.min(bounds.len() - 1)]]
}

/// The buffer handed to the agent loop: all three sources with section headers.
pub fn combine(html: &str, css: &str, js: &str) -> String {
    format!("HTML:\n{}\nCSS:\n{}\nJS:\n{}", html, css, js)
}

/// Coarse windows of at most `size` characters. Empty input gives no windows.
pub fn chunk_chars(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let mut out = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for c in text.chars() {
        current.push(c);
        count += 1;
        if count == size {
            out.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Splits scraped material so every request stays under a token budget.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudgeter {
    max_tokens_per_request: usize,
    safety_margin: usize,
}

impl TokenBudgeter {
    pub fn new(max_tokens_per_request: usize, safety_margin: usize) -> Self {
        Self {
            max_tokens_per_request,
            safety_margin,
        }
    }

    pub fn from_config(config: &BudgetConfig) -> Self {
        Self::new(config.max_tokens_per_request, config.safety_margin)
    }

    pub fn max_tokens_per_request(&self) -> usize {
        self.max_tokens_per_request
    }

    /// Tokens left for chunk text once `fixed_context` and the margin are reserved.
    pub fn available(&self, fixed_context: &str) -> Result<usize> {
        let required = estimate_size(fixed_context) + self.safety_margin;
        if required >= self.max_tokens_per_request {
            return Err(Error::BudgetExceeded {
                required,
                limit: self.max_tokens_per_request,
            });
        }
        Ok(self.max_tokens_per_request - required)
    }

    /// Split html/css/js into ordered chunks that each fit beside `fixed_context`.
    ///
    /// A chunk is bounded by its JSON-escaped size. A single piece larger than
    /// the whole window still becomes its own chunk.
    pub fn split(&self, html: &str, css: &str, js: &str, fixed_context: &str) -> Result<Vec<Chunk>> {
        let available = self.available(fixed_context)?;
        let buffer = combine(html, css, js);
        let bounds = boundaries(&buffer);
        let total = bounds.len() - 1;

        if escaped_size(&buffer) <= available {
            return Ok(vec![Chunk {
                index: 0,
                text: buffer,
            }]);
        }

        let costs: Vec<usize> = bounds
            .windows(2)
            .map(|w| piece_cost(&buffer[w[0]..w[1]]))
            .collect();

        let mut chunks = Vec::new();
        let mut first = 0;
        while first < total {
            let mut last = first;
            let mut cost = 0;
            while last < total && (last == first || cost + costs[last] <= available) {
                cost += costs[last];
                last += 1;
            }
            // escaped pieces can merge across their edges
            while last > first + 1 && escaped_size(&buffer[bounds[first]..bounds[last]]) > available {
                last -= 1;
            }
            chunks.push(Chunk {
                index: chunks.len(),
                text: buffer[bounds[first]..bounds[last]].to_string(),
            });
            first = last;
        }

        tracing::debug!(
            pieces = total,
            available,
            chunks = chunks.len(),
            "split buffer"
        );
        Ok(chunks)
    }
}
