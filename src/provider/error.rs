//! Model provider errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing API key for {backend}. Set {env_var}")]
    MissingApiKey { backend: String, env_var: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited, retry after {retry_after:?}s")]
    RateLimited { retry_after: Option<u64> },
}

/// Shorten an HTTP error body to the message a user should see.
///
/// `HTTP 529: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}`
/// becomes `HTTP 529: Overloaded (overloaded_error)`. Bodies that are not
/// JSON, or carry no message, come back unchanged.
#[must_use]
pub fn format_api_error(error: &str) -> String {
    let Some(json_start) = error.find('{') else {
        return error.to_string();
    };
    let (prefix, body) = error.split_at(json_start);

    let Some(msg) = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .as_ref()
        .and_then(extract_error_message)
    else {
        return error.to_string();
    };

    let prefix = prefix.trim().trim_end_matches(':');
    if prefix.is_empty() {
        msg
    } else {
        format!("{prefix}: {msg}")
    }
}

fn extract_error_message(json: &serde_json::Value) -> Option<String> {
    match json.get("error") {
        Some(serde_json::Value::String(msg)) => Some(msg.clone()),
        Some(error) => {
            let msg = error.get("message")?.as_str()?;
            match error.get("type").and_then(|t| t.as_str()) {
                Some(kind) => Some(format!("{msg} ({kind})")),
                None => Some(msg.to_string()),
            }
        }
        None => json
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
    }
}
