/// Error type surfaced by every reply operation.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Upstream error: status={status}, message={message}")]
    Status { status: u16, message: String },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category used by callers to pick a user-facing failure state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    QuotaExhausted,
    Permission,
    RateLimit,
    ServerError,
    Network,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        402 => ErrorCategory::QuotaExhausted,
        403 => ErrorCategory::Permission,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl ReplyError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ReplyError::Transport(_) => ErrorCategory::Network,
            ReplyError::Config(_)
            | ReplyError::Decode(_)
            | ReplyError::Storage(_)
            | ReplyError::Internal(_) => ErrorCategory::ServerError,
            ReplyError::Status { status, .. } => category_from_upstream_status(*status),
        }
    }

    /// Whether this error may trigger the non-streaming fallback when it
    /// interrupts a live stream.
    #[must_use]
    pub fn is_stream_failure(&self) -> bool {
        matches!(self, ReplyError::Transport(_) | ReplyError::Decode(_))
    }

    /// Upstream status code, when the error came from a non-2xx response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ReplyError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Reduce an upstream error body to a short human-readable message.
///
/// Prefers the `error.message` field of a JSON body; otherwise uses the raw
/// text. Either way the result is capped at 500 bytes on a char boundary.
#[must_use]
pub fn sanitize_upstream_error(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        let message = json
            .get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .and_then(serde_json::Value::as_str)
            .or_else(|| json.get("message").and_then(serde_json::Value::as_str));
        if let Some(msg) = message {
            return truncate_message(msg);
        }
    }
    truncate_message(String::from_utf8_lossy(body).trim())
}

fn truncate_message(msg: &str) -> String {
    const MAX_LEN: usize = 500;
    if msg.len() <= MAX_LEN {
        return msg.to_string();
    }
    let mut end = MAX_LEN;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &msg[..end])
}
