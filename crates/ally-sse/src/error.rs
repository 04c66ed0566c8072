use thiserror::Error;

/// Errors that end a streaming read
///
/// Malformed individual frames never show up here; the parser drops or defers them.
/// Everything in this enum is fatal to the current turn.
#[derive(Error, Debug)]
pub enum StreamError {
    /// HTTP request or body read failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The response carried no readable body
    #[error("stream unavailable")]
    StreamUnavailable,

    /// Transport failure reported by a non-HTTP byte source
    #[error("transport error: {0}")]
    Transport(String),
}

/// Parse error response from HTTP status and body
pub fn parse_error_response(status: reqwest::StatusCode, body: &bytes::Bytes) -> StreamError {
    let message = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|json| extract_error_message(&json))
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    StreamError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Extract error message from the JSON error shapes edge functions return
fn extract_error_message(json: &serde_json::Value) -> Option<String> {
    // {"error": {"message": "..."}}
    if let Some(message) = json.pointer("/error/message").and_then(|m| m.as_str()) {
        return Some(message.to_string());
    }

    // {"error": "..."}
    if let Some(message) = json.get("error").and_then(|e| e.as_str()) {
        return Some(message.to_string());
    }

    // Generic message field
    json.get("message")
        .and_then(|m| m.as_str())
        .map(ToString::to_string)
}
