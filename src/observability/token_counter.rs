use std::time::Duration;

use tracing::info;

use crate::protocol::request::ReplyRequest;
use crate::reply::ReplyResult;

/// Estimate the number of tokens in `text`.
///
/// Uses a lightweight heuristic (`bytes / 4`) to avoid loading model BPE tables.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Estimate the prompt tokens of a request: every segment's content.
#[must_use]
pub fn estimate_prompt_tokens(request: &ReplyRequest) -> u64 {
    request
        .segments()
        .iter()
        .map(|segment| estimate_tokens(&segment.content))
        .sum()
}

/// Log the completed reply at INFO level.
pub fn log_reply_usage(request: &ReplyRequest, result: &ReplyResult, duration: Duration) {
    info!(
        conversation_id = request.conversation_id(),
        model = %result.model,
        mode = ?result.mode,
        attempts = result.attempts,
        prompt_tokens = estimate_prompt_tokens(request),
        content_tokens = estimate_tokens(&result.content),
        reasoning_tokens = estimate_tokens(&result.reasoning),
        content_len = result.content.len(),
        reasoning_len = result.reasoning.len(),
        duration_seconds = duration.as_secs_f64(),
        "reply settled"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::request::PromptSegment;

    #[test]
    fn test_estimate_tokens_nonempty() {
        assert!(estimate_tokens("Hello, world!") > 0);
    }

    #[test]
    fn test_estimate_tokens_empty() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_estimate_prompt_tokens_sums_segments() {
        let request = ReplyRequest::new(
            "c",
            "m",
            vec![PromptSegment::system("abcd"), PromptSegment::user("abcdefgh")],
        );
        assert_eq!(estimate_prompt_tokens(&request), 3);
    }
}
