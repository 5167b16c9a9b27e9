//! One logical reply, from request to transcript entry.
//!
//! [`ResponseCoordinator`] drives the request and owns the in-flight
//! [`PlaceholderMessage`]; [`TranscriptReconciler`] turns the settled
//! placeholder into a durable [`MessageRecord`].

pub mod coordinator;
pub mod placeholder;
pub mod reconciler;

pub use coordinator::{ReplySettings, ResponseCoordinator, RetryBudget};
pub use placeholder::PlaceholderMessage;
pub use reconciler::{next_timestamp, Clock, Splice, SystemClock, TranscriptReconciler};

use chrono::{DateTime, Utc};

use crate::protocol::request::Role;

/// How the final text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// Accumulated from an event stream.
    Streamed,
    /// Decoded from a single JSON document.
    Document,
}

/// Final output of one reply. Produced once per request lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyResult {
    pub content: String,
    /// Possibly empty.
    pub reasoning: String,
    /// Model that actually answered.
    pub model: String,
    pub mode: ReplyMode,
    /// Physical requests issued, counting quota retries and fallback.
    pub attempts: u32,
}

/// A finalized transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: uuid::Uuid,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub reasoning: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}
