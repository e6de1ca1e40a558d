use repolens_types::{Backend, Result};
use serde_json::Value;

/// Attempts made by [`complete_json`] before giving up.
pub const JSON_ATTEMPTS: usize = 3;

/// Requests a JSON object completion through
/// [`Backend::complete_json_object`].
///
/// Malformed responses are retried up to [`JSON_ATTEMPTS`] times; when every
/// attempt fails to parse, the last parse error is logged and an empty object
/// is returned. Backend errors propagate immediately.
pub fn complete_json(backend: &dyn Backend, prompt: &str) -> Result<Value> {
    let mut last_error = None;

    for attempt in 1..=JSON_ATTEMPTS {
        let text = backend.complete_json_object(prompt)?;
        match serde_json::from_str::<Value>(strip_fences(&text)) {
            Ok(value @ Value::Object(_)) => return Ok(value),
            Ok(other) => {
                last_error = Some(format!("expected a JSON object, got {other}"));
            }
            Err(e) => last_error = Some(e.to_string()),
        }
        tracing::debug!(model = backend.model(), attempt, "malformed JSON completion");
    }

    tracing::warn!(
        model = backend.model(),
        error = last_error.as_deref().unwrap_or("unknown"),
        "no valid JSON after {JSON_ATTEMPTS} attempts"
    );
    Ok(Value::Object(serde_json::Map::new()))
}

/// Models often wrap JSON in a markdown code fence.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ── Tests ──────────────────────────────────────────────────────────────────
