use serde_json::{json, Value};

pub const PARSE_FAILURE_MESSAGE: &str = "Failed to parse AI response";

/// Model output after JSON extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOutput {
    pub payload: Value,
    pub parse_failed: bool,
}

/// Parses the model's reply as JSON.
///
/// A reply wrapped in a markdown code fence is unwrapped first. Text that
/// still isn't JSON is kept verbatim inside a fallback object carrying
/// `parse_failed: true`, so nothing the model returned is lost.
pub fn parse_model_output(text: &str) -> ParsedOutput {
    let candidate = strip_code_fence(text);

    match serde_json::from_str::<Value>(candidate) {
        Ok(payload) => ParsedOutput {
            payload,
            parse_failed: false,
        },
        Err(e) => {
            log::warn!("Model output is not valid JSON: {}", e);
            ParsedOutput {
                payload: fallback(text),
                parse_failed: true,
            }
        }
    }
}

pub fn fallback(raw: &str) -> Value {
    json!({
        "error": PARSE_FAILURE_MESSAGE,
        "parse_failed": true,
        "raw_response": raw,
    })
}

/// Whether a stored payload is a parse-failure fallback.
pub fn is_fallback(payload: &Value) -> bool {
    payload
        .get("parse_failed")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`...) on the opening line.
    match body.split_once('\n') {
        Some((info, inner)) if !info.trim_start().starts_with(['{', '[']) => inner.trim(),
        _ => body.trim(),
    }
}
