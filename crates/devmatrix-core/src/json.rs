//! Cleaning and extraction helpers for LLM responses.
//!
//! Models wrap JSON in Markdown fences, preambles, and trailing prose.
//! These helpers strip the wrapping and pull out the first well-formed JSON
//! value so callers can hand the result straight to `serde_json`.

use crate::error::{Error, Result};

/// Strip Markdown code fences from a response.
pub fn strip_code_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Extract the first balanced JSON array from `response` and parse it.
pub fn extract_first_json_array(response: &str) -> Result<serde_json::Value> {
    extract_first_delimited(strip_code_fences(response), '[', ']')
}

/// Extract the first balanced JSON object from `response` and parse it.
pub fn extract_first_json_object(response: &str) -> Result<serde_json::Value> {
    extract_first_delimited(strip_code_fences(response), '{', '}')
}

/// Scan for the first `open`..`close` balanced span outside string literals
/// and parse it as JSON.
fn extract_first_delimited(text: &str, open: char, close: char) -> Result<serde_json::Value> {
    let start = text.find(open).ok_or_else(|| {
        Error::StructuredParse(format!("no '{open}' found in response of {} chars", text.len()))
    })?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let span = &text[start..=start + offset];
                    return serde_json::from_str(span).map_err(|e| {
                        Error::StructuredParse(format!("candidate span is not valid JSON: {e}"))
                    });
                }
            }
            _ => {}
        }
    }

    Err(Error::StructuredParse(format!(
        "unbalanced '{open}' starting at byte {start}"
    )))
}
