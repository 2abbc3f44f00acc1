use reqwest::StatusCode;
use serde_json::Value;

/// Classified failure of a probe or page request. The `Display` text is the
/// message shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Authentication rejected. Check your JustCall API key and secret.")]
    AuthRejected,

    #[error("Rate limit exceeded. Try a narrower date range or a longer delay between pages.")]
    RateLimited,

    #[error("Connection path unavailable: {0}")]
    TransportUnavailable(String),

    #[error("JustCall API returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Could not reach the JustCall API through any connection strategy (tried: {})", .attempted.join(", "))]
    ConnectionFailed { attempted: Vec<String> },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Maps a non-success HTTP response onto an error category.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::AuthRejected,
            StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited,
            StatusCode::NOT_FOUND => {
                FetchError::TransportUnavailable(format!("endpoint not found (HTTP {})", status))
            }
            _ => FetchError::Upstream {
                status: status.as_u16(),
                message: upstream_message(body),
            },
        }
    }

    /// True for failures that say nothing about the credentials, so the next
    /// connection strategy may still succeed.
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::TransportUnavailable(_))
    }

    pub fn category(&self) -> &'static str {
        match self {
            FetchError::AuthRejected => "auth_rejected",
            FetchError::RateLimited => "rate_limited",
            FetchError::TransportUnavailable(_) => "transport_unavailable",
            FetchError::Upstream { .. } => "upstream_error",
            FetchError::ConnectionFailed { .. } => "connection_failed",
            FetchError::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::from_status(status, ""),
            None => FetchError::TransportUnavailable(err.to_string()),
        }
    }
}

/// Prefers the `message` (or `error`) field of a JSON error body, falling
/// back to the raw body text.
fn upstream_message(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        for key in ["message", "error"] {
            if let Some(Value::String(s)) = map.get(key) {
                if !s.is_empty() {
                    return s.clone();
                }
            }
        }
    }
    trimmed.to_string()
}
