//! Tool response filter
//!
//! Oversized tool outputs re-entering the model context are the main cause of
//! upstream rate-limit failures, so every Mesh result passes through this
//! filter before it is appended to the conversation. The transform is pure:
//! no connection or clock is involved, which keeps it unit-testable.
//!
//! Token sizes are estimated from serialized character counts. The
//! characters-per-token ratio is approximate and model-specific, so it is a
//! configurable field rather than a constant.

use serde_json::{json, Map, Value};

/// Default token budget applied per tool result
pub const DEFAULT_MAX_TOKENS: usize = 8000;
/// Default estimate of characters per token
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;
/// Marker appended to every truncated string
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// How many entries of a list-shaped result survive truncation
const MAX_LIST_ENTRIES: usize = 5;
/// Cap on each surviving entry's free-text field
const MAX_ENTRY_TEXT_CHARS: usize = 1000;

/// Field names that mark a result as list-shaped (search results and the like)
const LIST_FIELDS: &[&str] = &["results", "items", "data"];
/// Free-text fields inside list entries, in lookup order
const TEXT_FIELDS: &[&str] = &["text", "content", "snippet", "description"];

/// Truncates tool results to a token budget before they re-enter the model
/// context.
#[derive(Debug, Clone)]
pub struct ResponseFilter {
    max_tokens: usize,
    chars_per_token: usize,
}

impl Default for ResponseFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS)
    }
}

impl ResponseFilter {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }

    pub fn with_chars_per_token(mut self, ratio: usize) -> Self {
        self.chars_per_token = ratio.max(1);
        self
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Estimate the token count of a serialized value
    pub fn estimate_tokens(&self, value: &Value) -> usize {
        let chars = value.to_string().chars().count();
        chars.div_ceil(self.chars_per_token)
    }

    /// Filter a tool result down to the token budget.
    ///
    /// Results within budget are returned unchanged, so filtering an
    /// already-filtered result is a no-op.
    pub fn filter(&self, value: Value) -> Value {
        if self.estimate_tokens(&value) <= self.max_tokens {
            return value;
        }

        let value = match self.truncate_list(value) {
            Ok(truncated) => {
                // List truncation usually lands well under budget, but other
                // fields may still be oversized.
                if self.estimate_tokens(&truncated) <= self.max_tokens {
                    return truncated;
                }
                truncated
            }
            Err(original) => original,
        };

        self.truncate_serialized(&value)
    }

    /// Truncate a list-shaped result: keep the first few entries and cap each
    /// entry's free-text field. Returns `Err` with the original value when no
    /// recognizable list field is present.
    fn truncate_list(&self, value: Value) -> Result<Value, Value> {
        let Value::Object(ref obj) = value else {
            return Err(value);
        };
        let Some(field) = LIST_FIELDS
            .iter()
            .find(|f| obj.get(**f).is_some_and(Value::is_array))
        else {
            return Err(value);
        };

        let Value::Object(mut obj) = value else {
            unreachable!()
        };
        let Some(Value::Array(entries)) = obj.remove(*field) else {
            unreachable!()
        };

        let original_count = entries.len();
        let kept: Vec<Value> = entries
            .into_iter()
            .take(MAX_LIST_ENTRIES)
            .map(truncate_entry_text)
            .collect();

        obj.insert(field.to_string(), Value::Array(kept));
        obj.insert("_truncated".to_string(), Value::Bool(true));
        obj.insert("_originalCount".to_string(), json!(original_count));
        Ok(Value::Object(obj))
    }

    /// Fallback: serialize the whole value, cut it so the final wrapper fits
    /// the character budget, and try to re-parse. Unparseable remainders are
    /// wrapped instead of dropped.
    ///
    /// The cut is measured in escaped characters, since the content is
    /// re-escaped when it lands inside the wrapper string. Reserving the
    /// marker and wrapper overhead up front keeps the output within budget,
    /// so a second pass sees it as small and leaves it alone.
    fn truncate_serialized(&self, value: &Value) -> Value {
        let serialized = value.to_string();
        let budget = self.max_tokens * self.chars_per_token;
        let content_budget =
            budget.saturating_sub(WRAPPER_OVERHEAD_CHARS + TRUNCATION_MARKER.len());

        let mut cut = String::new();
        let mut cost = 0;
        for c in serialized.chars() {
            let c_cost = escaped_char_cost(c);
            if cost + c_cost > content_budget {
                break;
            }
            cost += c_cost;
            cut.push(c);
        }
        cut.push_str(TRUNCATION_MARKER);

        match serde_json::from_str::<Value>(&cut) {
            Ok(reparsed) => reparsed,
            Err(_) => json!({
                "_truncated": true,
                "content": cut,
            }),
        }
    }
}

/// Serialized length of the wrapper form with empty content,
/// `{"_truncated":true,"content":""}`
const WRAPPER_OVERHEAD_CHARS: usize = 32;

/// Character count a char contributes once JSON-escaped inside a string
fn escaped_char_cost(c: char) -> usize {
    match c {
        '"' | '\\' | '\n' | '\r' | '\t' | '\u{8}' | '\u{c}' => 2,
        c if (c as u32) < 0x20 => 6,
        _ => 1,
    }
}

/// Cap an entry's free-text field, marking the cut
fn truncate_entry_text(entry: Value) -> Value {
    let Value::Object(obj) = entry else {
        return entry;
    };
    let mut obj: Map<String, Value> = obj;

    for field in TEXT_FIELDS {
        if let Some(Value::String(text)) = obj.get(*field) {
            if text.chars().count() > MAX_ENTRY_TEXT_CHARS {
                let mut cut: String = text.chars().take(MAX_ENTRY_TEXT_CHARS).collect();
                cut.push_str(TRUNCATION_MARKER);
                obj.insert(field.to_string(), Value::String(cut));
            }
            break;
        }
    }

    Value::Object(obj)
}
