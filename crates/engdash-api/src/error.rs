use serde_json::Value;
use thiserror::Error;

const MAX_BODY_IN_MESSAGE: usize = 200;

/// Failure of a request against the entity API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {}", summarize(body))]
    Status { status: u16, body: String },

    /// The request never produced a response (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Transport(String),

    /// The response body was not the JSON shape expected.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// The background request thread is not running.
    #[error("request executor is not running")]
    ExecutorGone,
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }

    /// Message suitable for inline display on a page: the server's
    /// `detail` when the body carries one, the raw body otherwise.
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { status, body } => match detail(body) {
                Some(detail) => detail,
                None if body.trim().is_empty() => format!("HTTP {status}"),
                None => summarize(body),
            },
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// `detail` of a JSON error body. Field errors (`{"name": ["required"]}`)
/// are flattened into `name: required`.
fn detail(body: &str) -> Option<String> {
    let Value::Object(map) = serde_json::from_str::<Value>(body).ok()? else {
        return None;
    };
    if let Some(Value::String(detail)) = map.get("detail") {
        return Some(detail.clone());
    }
    let parts: Vec<String> = map
        .iter()
        .filter_map(|(field, v)| match v {
            Value::Array(msgs) => {
                let msgs: Vec<&str> = msgs.iter().filter_map(Value::as_str).collect();
                (!msgs.is_empty()).then(|| format!("{field}: {}", msgs.join(" ")))
            }
            Value::String(msg) => Some(format!("{field}: {msg}")),
            _ => None,
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("; "))
}

fn summarize(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_BODY_IN_MESSAGE) {
        Some((cut, _)) => format!("{}\u{2026}", &body[..cut]),
        None => body.to_string(),
    }
}
