use serde_json::{Map, Value};

use crate::error::AgentError;

/// Pull the first JSON object out of free-form model output.
///
/// Tried in order: the whole text, the first fenced code block (with or
/// without a language tag), then each balanced `{ ... }` span from left to
/// right. Prose such as "from {low} to {high}" before the payload is skipped.
pub fn extract_json(text: &str) -> Result<Value, AgentError> {
    let trimmed = text.trim();

    let whole = std::iter::once(trimmed.to_string());
    let fenced = fenced_block(trimmed).into_iter();
    let spans = balanced_objects(trimmed);

    whole
        .chain(fenced)
        .chain(spans)
        .find_map(|candidate| {
            serde_json::from_str::<Value>(&candidate)
                .ok()
                .filter(Value::is_object)
        })
        .ok_or_else(|| {
            AgentError::Parse(format!(
                "No valid JSON object found in response (length={})",
                text.len()
            ))
        })
}

/// Parse a specialist payload. Anything but a JSON object is a parse error.
pub fn parse_payload(raw: &str) -> Result<Map<String, Value>, AgentError> {
    match extract_json(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(AgentError::Parse(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn fenced_block(text: &str) -> Option<String> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip the optional language tag on the opening line
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim().to_string())
}

/// Every top-level balanced `{ ... }` span, in order of appearance.
fn balanced_objects(text: &str) -> impl Iterator<Item = String> + '_ {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' if depth > 0 => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        spans.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    spans.into_iter().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_clean_json() {
        let input = r#"{"direction": "BUY", "confidence": 7}"#;
        let value = extract_json(input).unwrap();
        assert_eq!(value["direction"], "BUY");
    }

    #[test]
    fn extract_from_markdown() {
        let input = "Here is my call:\n```json\n{\"direction\": \"SELL\"}\n```\nDone.";
        assert_eq!(extract_json(input).unwrap()["direction"], "SELL");
    }

    #[test]
    fn extract_from_markdown_no_lang() {
        let input = "Result:\n```\n{\"confidence\": \"6.5\"}\n```";
        assert_eq!(extract_json(input).unwrap()["confidence"], "6.5");
    }

    #[test]
    fn prose_braces_before_payload_are_skipped() {
        let input = "BTC ranged {62k} to {65k} this week.\n{\"asset\": \"BTC\", \"direction\": \"HOLD\"}";
        let value = extract_json(input).unwrap();
        assert_eq!(value["asset"], "BTC");
    }

    #[test]
    fn braces_inside_strings() {
        let input = r#"{"rationale": "price went from {low} to {high}", "confidence": 5}"#;
        assert_eq!(extract_json(input).unwrap()["confidence"], 5);
    }

    #[test]
    fn plain_text_is_an_error() {
        let result = extract_json("I could not reach the data provider.");
        assert!(matches!(result, Err(AgentError::Parse(_))));
    }

    #[test]
    fn object_inside_array_is_found() {
        let result = parse_payload(r#"[{"direction": "BUY"}]"#);
        let map = result.unwrap();
        assert_eq!(map["direction"], "BUY");
        assert!(parse_payload("[1, 2, 3]").is_err());
    }
}
