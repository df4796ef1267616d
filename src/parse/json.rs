//! JSON object extraction from free-form model text.
//!
//! Backends are text generators, so a structured answer may arrive wrapped in
//! markdown fences, preceded by commentary or cut off mid-object. Extraction
//! here never fails loudly: callers get an [`ObjectExtraction`] describing
//! what was (or was not) found.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?i)^```(?:json)?\s*|\s*```$").expect("valid fence regex"))
}

fn object_pattern() -> &'static Regex {
    static OBJECT: OnceLock<Regex> = OnceLock::new();
    OBJECT.get_or_init(|| Regex::new(r"\{[\s\S]*\}").expect("valid object regex"))
}

/// Outcome of looking for a JSON object in model output.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectExtraction {
    /// A brace-delimited block decoded into a JSON object.
    Found(Map<String, Value>),
    /// A block was located but did not decode into an object.
    Malformed(String),
    /// An opening brace was found without its closing counterpart.
    Truncated { unclosed_braces: usize },
    /// No brace-delimited content at all.
    NotFound,
}

impl ObjectExtraction {
    /// Returns the decoded object, if any.
    pub fn into_object(self) -> Option<Map<String, Value>> {
        match self {
            ObjectExtraction::Found(object) => Some(object),
            _ => None,
        }
    }

    /// Short description used in failure diagnostics.
    pub fn describe(&self) -> String {
        match self {
            ObjectExtraction::Found(object) => format!("object with {} keys", object.len()),
            ObjectExtraction::Malformed(reason) => format!("malformed JSON: {}", reason),
            ObjectExtraction::Truncated { unclosed_braces } => {
                format!("truncated JSON: {} unclosed braces", unclosed_braces)
            }
            ObjectExtraction::NotFound => "no JSON object found".to_string(),
        }
    }
}

/// Removes an optional leading ```` ```json ```` / ```` ``` ```` fence and a trailing fence.
pub fn strip_code_fences(text: &str) -> String {
    fence_pattern().replace_all(text.trim(), "").into_owned()
}

/// Greedily matches from the first `{` to the last `}`.
pub fn greedy_object_block(text: &str) -> Option<&str> {
    object_pattern().find(text).map(|m| m.as_str())
}

/// Counts braces left open outside string literals.
pub fn unclosed_braces(s: &str) -> usize {
    let mut depth: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => depth -= 1,
            _ => {}
        }
    }

    depth.max(0) as usize
}

/// Locates and decodes the first top-level JSON object in `text`.
pub fn extract_json_object(text: &str) -> ObjectExtraction {
    if text.trim().is_empty() {
        return ObjectExtraction::NotFound;
    }

    let stripped = strip_code_fences(text);
    let Some(block) = greedy_object_block(&stripped) else {
        return match stripped.find('{') {
            Some(start) => ObjectExtraction::Truncated {
                unclosed_braces: unclosed_braces(&stripped[start..]).max(1),
            },
            None => ObjectExtraction::NotFound,
        };
    };

    match serde_json::from_str::<Value>(block) {
        Ok(Value::Object(object)) => ObjectExtraction::Found(object),
        Ok(other) => ObjectExtraction::Malformed(format!("expected object, got {}", other)),
        Err(e) => {
            let open = unclosed_braces(block);
            if open > 0 {
                ObjectExtraction::Truncated {
                    unclosed_braces: open,
                }
            } else {
                ObjectExtraction::Malformed(e.to_string())
            }
        }
    }
}

/// Returns at most `max_chars` characters of `text` for log excerpts.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
