//! Recover JSON objects from loosely formatted model output.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

static OPEN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```[a-z0-9_+-]*").expect("valid regex"));
static CLOSE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```$").expect("valid regex"));

/// Drop a fence opening the reply and a fence closing it. Fences elsewhere,
/// e.g. inside string values, are content.
fn strip_fences(raw: &str) -> &str {
    let text = raw.trim();
    let text = OPEN_FENCE.find(text).map_or(text, |m| &text[m.end()..]);
    let text = text.trim_end();
    let text = CLOSE_FENCE.find(text).map_or(text, |m| &text[..m.start()]);
    text.trim()
}

/// Parse `raw` into a JSON object, repairing common model formatting mistakes.
///
/// Handles code fences, commentary around the object, backtick or single
/// quoted strings, bare keys, trailing commas and raw newlines inside strings.
/// Repairs only run when the direct parse fails, so valid JSON is never altered.
pub fn repair(raw: &str) -> Result<Value> {
    let unfenced = strip_fences(raw);
    let span = object_span(unfenced).ok_or_else(|| Error::UnrecoverableFormat {
        reason: "no JSON object found".into(),
        cleaned: unfenced.to_string(),
    })?;

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(span) {
        return Ok(value);
    }

    let cleaned = normalize(span);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(Error::UnrecoverableFormat {
            reason: "not a JSON object".into(),
            cleaned,
        }),
        Err(e) => Err(Error::UnrecoverableFormat {
            reason: e.to_string(),
            cleaned,
        }),
    }
}

/// Repair then deserialize into `T`.
pub fn repair_as<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let value = repair(raw)?;
    let cleaned = value.to_string();
    serde_json::from_value(value).map_err(|e| Error::UnrecoverableFormat {
        reason: e.to_string(),
        cleaned,
    })
}

/// From the first `{` to the last `}`.
fn object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Quote-aware rewrite of a JSON-ish object into strict JSON.
fn normalize(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    // delimiter of the string we are in, if any
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(delim) = quote {
            match c {
                '\\' => {
                    match chars.get(i + 1) {
                        // \' and \` are not JSON escapes
                        Some(&next) if next == '\'' || next == '`' => out.push(next),
                        Some(&next) => {
                            out.push('\\');
                            out.push(next);
                        }
                        None => out.push_str("\\\\"),
                    }
                    i += 2;
                    continue;
                }
                c if c == delim => {
                    out.push('"');
                    quote = None;
                }
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c => out.push(c),
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' | '`' => {
                quote = Some(c);
                out.push('"');
                i += 1;
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(',');
                }
                i += 1;
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$' | '-'))
                {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let next = chars[i..].iter().find(|c| !c.is_whitespace());
                if next == Some(&':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_json_untouched() {
        let raw = r#"{"html": "<a href='x'>`y`</a>", "n": 1}"#;
        assert_eq!(
            repair(raw).unwrap(),
            json!({"html": "<a href='x'>`y`</a>", "n": 1})
        );
    }

    #[test]
    fn test_fenced_unquoted_single_quoted_trailing_comma() {
        let raw = "```json\n{html: \"x\", css: 'y',}\n```";
        assert_eq!(repair(raw).unwrap(), json!({"html": "x", "css": "y"}));
    }

    #[test]
    fn test_fences_inside_strings_are_kept() {
        let raw = r#"{"js": "const md = '```js\nx\n```';"}"#;
        let expected = json!({"js": "const md = '```js\nx\n```';"});
        assert_eq!(repair(raw).unwrap(), expected);

        let fenced = format!("```json\n{raw}\n```");
        assert_eq!(repair(&fenced).unwrap(), expected);

        let loose = "```js\n{js: 'a ```b``` c',}\n```";
        assert_eq!(repair(loose).unwrap(), json!({"js": "a ```b``` c"}));
    }

    #[test]
    fn test_fence_after_commentary() {
        let raw = "Here you go:\n```json\n{\"step\": \"THINK\"}\n```\nDone.";
        assert_eq!(repair(raw).unwrap(), json!({"step": "THINK"}));
    }

    #[test]
    fn test_commentary_around_object() {
        let raw = "Sure! Here is the result:\n{\"step\": \"OUTPUT\"}\nLet me know.";
        assert_eq!(repair(raw).unwrap(), json!({"step": "OUTPUT"}));
    }

    #[test]
    fn test_newlines_inside_strings() {
        let raw = "{\"html\": \"<div>\n  <p>hi</p>\n</div>\",\n\"css\": \"\"}";
        let value = repair(raw).unwrap();
        assert_eq!(value["html"], "<div>\n  <p>hi</p>\n</div>");
        assert_eq!(value["css"], "");
    }

    #[test]
    fn test_backtick_strings() {
        let raw = "{step: \"OUTPUT\", content: {js: `const a = \"b\";\nrun();`}}";
        let value = repair(raw).unwrap();
        assert_eq!(value["content"]["js"], "const a = \"b\";\nrun();");
    }

    #[test]
    fn test_single_quotes_with_inner_double_quotes() {
        let raw = "{'html': '<div class=\"a\">it\\'s</div>'}";
        assert_eq!(
            repair(raw).unwrap(),
            json!({"html": "<div class=\"a\">it's</div>"})
        );
    }

    #[test]
    fn test_trailing_comma_in_array() {
        let raw = "{items: [1, 2, 3, ], ok: true,}";
        assert_eq!(repair(raw).unwrap(), json!({"items": [1, 2, 3], "ok": true}));
    }

    #[test]
    fn test_no_object() {
        let err = repair("I could not do that.").unwrap_err();
        assert!(matches!(err, Error::UnrecoverableFormat { .. }));
        assert!(repair("} nothing {").is_err());
    }

    #[test]
    fn test_unrecoverable_carries_cleaned_text() {
        match repair("{html: <div>}") {
            Err(Error::UnrecoverableFormat { cleaned, .. }) => {
                assert!(cleaned.starts_with("{\"html\""));
            }
            other => panic!("expected UnrecoverableFormat, got {other:?}"),
        }
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "```json\n{html: \"x\", css: 'y',}\n```",
            "{\"a\": \"line\nbreak\", b: [1,],}",
            "noise {`k`: `v`} noise",
        ];
        for raw in inputs {
            let once = repair(raw).unwrap();
            let twice = repair(&once.to_string()).unwrap();
            assert_eq!(once, twice, "input: {raw:?}");
        }
    }

    #[test]
    fn test_repair_as() {
        #[derive(serde::Deserialize)]
        struct Pair {
            html: String,
            css: String,
        }
        let pair: Pair = repair_as("{html: 'a', css: 'b'}").unwrap();
        assert_eq!((pair.html.as_str(), pair.css.as_str()), ("a", "b"));
        assert!(repair_as::<Pair>("{html: 'a'}").is_err());
    }
}
