// Raw payload validation
//
// Both APIs occasionally answer with an HTML error page (captive portals,
// device web UI fallbacks, proxy errors) under a 200 status. Bodies are
// checked here before anything tries to interpret them.

use serde_json::Value;

use crate::error::Error;

/// Longest body prefix kept in a `DataFormat` error.
const BODY_PREVIEW_CHARS: usize = 256;

/// Parse a raw response body as JSON, rejecting anything that is clearly
/// not a JSON document.
pub fn parse_json_payload(body: &str) -> Result<Value, Error> {
    let trimmed = body.trim_start_matches('\u{feff}').trim();

    if trimmed.is_empty() {
        return Err(Error::DataFormat {
            message: "empty response body".into(),
            body: String::new(),
        });
    }

    if trimmed.starts_with('<') {
        return Err(Error::DataFormat {
            message: "received markup instead of JSON".into(),
            body: preview(trimmed),
        });
    }

    serde_json::from_str(trimmed).map_err(|e| Error::DataFormat {
        message: e.to_string(),
        body: preview(trimmed),
    })
}

/// Parse a payload that must be a JSON object at the top level.
pub fn parse_object_payload(body: &str) -> Result<Value, Error> {
    let value = parse_json_payload(body)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(Error::DataFormat {
            message: format!("expected a JSON object, got {}", kind_name(&value)),
            body: preview(body),
        })
    }
}

pub(crate) fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
