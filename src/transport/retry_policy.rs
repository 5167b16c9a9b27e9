use std::time::{Duration, SystemTime};

use http::header::RETRY_AFTER;

const BACKOFF_BASE_MS: u64 = 100;
const BACKOFF_MAX_MS: u64 = 1_000;
const RETRY_AFTER_MAX_SECS: u64 = 30;
const FAST_RETRY_SECOND_MS: u64 = 10;

/// Wire-level retry rules for one upstream request.
///
/// Covers rate limiting, overload and transient connection failures only.
/// A 402 is never retried here; the quota edge above decides what to do
/// with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Policy that surfaces every failure immediately.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(0)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retrying a response with `status`, or `None` when the
    /// response must be returned as is. `attempt` counts retries already made.
    #[must_use]
    pub fn delay_for_status(
        &self,
        status: http::StatusCode,
        headers: &http::HeaderMap,
        attempt: u32,
    ) -> Option<Duration> {
        if attempt >= self.max_attempts || !is_retryable_status(status) {
            return None;
        }
        Some(parse_retry_after(headers).unwrap_or_else(|| backoff_delay(attempt)))
    }

    /// Delay before retrying after a failed send, or `None` when the error
    /// is not transient or the attempts are used up.
    #[must_use]
    pub fn delay_for_transport_error(&self, message: &str, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts || !is_transient_message(message) {
            return None;
        }
        if is_dropped_connection(message) {
            return Some(if attempt == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(FAST_RETRY_SECOND_MS)
            });
        }
        Some(backoff_delay(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

#[inline]
fn is_retryable_status(status: http::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 503 | 529)
}

const DROPPED_CONNECTION_NEEDLES: [&[u8]; 6] = [
    b"connection reset",
    b"connection aborted",
    b"broken pipe",
    b"http2 error",
    b"unexpected eof",
    b"stream closed",
];

const SLOW_FAILURE_NEEDLES: [&[u8]; 3] = [b"timed out", b"timeout", b"connection refused"];

fn is_transient_message(message: &str) -> bool {
    let haystack = message.as_bytes();
    DROPPED_CONNECTION_NEEDLES
        .iter()
        .chain(SLOW_FAILURE_NEEDLES.iter())
        .any(|needle| contains_ignore_ascii_case(haystack, needle))
}

fn is_dropped_connection(message: &str) -> bool {
    let haystack = message.as_bytes();
    DROPPED_CONNECTION_NEEDLES
        .iter()
        .any(|needle| contains_ignore_ascii_case(haystack, needle))
}

#[inline]
fn contains_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty()
        || haystack
            .windows(needle.len())
            .any(|window| window.eq_ignore_ascii_case(needle))
}

/// Exponential backoff capped at one second, with up to 20% jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let capped = BACKOFF_BASE_MS
        .saturating_mul(1_u64 << attempt.min(10))
        .min(BACKOFF_MAX_MS);
    let jitter = fastrand::u64(0..=capped / 5);
    Duration::from_millis(capped + jitter)
}

/// `Retry-After` as delta-seconds or an HTTP date, capped at 30 seconds.
fn parse_retry_after(headers: &http::HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    let cap = Duration::from_secs(RETRY_AFTER_MAX_SECS);
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds).min(cap));
    }
    let target = httpdate::parse_http_date(raw).ok()?;
    let delay = target.duration_since(SystemTime::now()).unwrap_or_default();
    Some(delay.min(cap))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_retry_after(value: &str) -> http::HeaderMap {
        let mut headers = http::HeaderMap::new();
        headers.insert(RETRY_AFTER, http::HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_retryable_statuses() {
        let policy = RetryPolicy::default();
        let empty = http::HeaderMap::new();
        for code in [429, 503, 529] {
            let status = http::StatusCode::from_u16(code).unwrap();
            assert!(policy.delay_for_status(status, &empty, 0).is_some(), "{code}");
        }
        for code in [400, 401, 402, 404, 500] {
            let status = http::StatusCode::from_u16(code).unwrap();
            assert!(policy.delay_for_status(status, &empty, 0).is_none(), "{code}");
        }
    }

    #[test]
    fn test_attempts_are_capped() {
        let policy = RetryPolicy::new(2);
        let empty = http::HeaderMap::new();
        let status = http::StatusCode::TOO_MANY_REQUESTS;
        assert!(policy.delay_for_status(status, &empty, 1).is_some());
        assert!(policy.delay_for_status(status, &empty, 2).is_none());
        assert!(RetryPolicy::disabled()
            .delay_for_status(status, &empty, 0)
            .is_none());
    }

    #[test]
    fn test_retry_after_seconds_wins_over_backoff() {
        let delay = RetryPolicy::default().delay_for_status(
            http::StatusCode::SERVICE_UNAVAILABLE,
            &headers_with_retry_after("5"),
            0,
        );
        assert_eq!(delay, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_retry_after_is_capped() {
        assert_eq!(
            parse_retry_after(&headers_with_retry_after("3600")),
            Some(Duration::from_secs(RETRY_AFTER_MAX_SECS))
        );
    }

    #[test]
    fn test_retry_after_http_date() {
        let target = SystemTime::now() + Duration::from_secs(2);
        let delay = parse_retry_after(&headers_with_retry_after(&httpdate::fmt_http_date(target)))
            .unwrap();
        assert!(delay <= Duration::from_secs(2));
    }

    #[test]
    fn test_retry_after_invalid() {
        assert!(parse_retry_after(&headers_with_retry_after("soon")).is_none());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let first = backoff_delay(0);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(120));
        let late = backoff_delay(8);
        assert!(late >= Duration::from_millis(1_000) && late <= Duration::from_millis(1_200));
    }

    #[test]
    fn test_dropped_connection_retries_fast() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for_transport_error("connection reset by peer", 0),
            Some(Duration::ZERO)
        );
        assert_eq!(
            policy.delay_for_transport_error("HTTP2 Error while reading frame", 1),
            Some(Duration::from_millis(FAST_RETRY_SECOND_MS))
        );
    }

    #[test]
    fn test_timeout_uses_backoff_and_unknown_errors_surface() {
        let policy = RetryPolicy::default();
        let delay = policy
            .delay_for_transport_error("operation timed out", 0)
            .unwrap();
        assert!(delay >= Duration::from_millis(100));
        assert!(policy
            .delay_for_transport_error("invalid certificate", 0)
            .is_none());
    }
}
