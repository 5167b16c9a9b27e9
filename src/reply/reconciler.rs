use chrono::{DateTime, Duration, Timelike, Utc};

use crate::error::ReplyError;
use crate::protocol::request::Role;
use crate::state::TranscriptStore;

use super::placeholder::PlaceholderMessage;
use super::{MessageRecord, ReplyResult};

/// Source of wall-clock time for transcript timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Instruction for the view layer: put `record` where the placeholder was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub placeholder_id: uuid::Uuid,
    pub record: MessageRecord,
}

impl Splice {
    /// Replace the placeholder entry in `messages`, or append when absent.
    pub fn apply(self, messages: &mut Vec<MessageRecord>) {
        match messages
            .iter()
            .position(|message| message.id == self.placeholder_id)
        {
            Some(index) => messages[index] = self.record,
            None => messages.push(self.record),
        }
    }
}

fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = at.nanosecond();
    at.with_nanosecond(nanos - nanos % 1_000_000).unwrap_or(at)
}

/// Timestamp for a new entry: `now` truncated to milliseconds, pushed to one
/// millisecond after `latest` when it would not sort strictly after it.
#[must_use]
pub fn next_timestamp(now: DateTime<Utc>, latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = truncate_to_millis(now);
    match latest {
        Some(latest) if now <= latest => truncate_to_millis(latest) + Duration::milliseconds(1),
        _ => now,
    }
}

/// Turns a settled placeholder into a durable transcript entry.
pub struct TranscriptReconciler<S, C = SystemClock> {
    store: S,
    clock: C,
}

impl<S: TranscriptStore> TranscriptReconciler<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: TranscriptStore, C: Clock> TranscriptReconciler<S, C> {
    #[must_use]
    pub fn with_clock(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Store the final message and return the splice for the view.
    ///
    /// The record keeps the placeholder id. Its content comes from `result`;
    /// whatever the placeholder mirrored is discarded.
    ///
    /// # Errors
    ///
    /// Propagates the store's [`ReplyError::Storage`].
    pub fn reconcile(
        &self,
        placeholder: PlaceholderMessage,
        result: &ReplyResult,
    ) -> Result<Splice, ReplyError> {
        let created_at = next_timestamp(
            self.clock.now(),
            self.store.latest_timestamp(placeholder.conversation_id()),
        );
        let record = MessageRecord {
            id: placeholder.id(),
            conversation_id: placeholder.conversation_id().to_owned(),
            role: Role::Assistant,
            content: result.content.clone(),
            reasoning: result.reasoning.clone(),
            model: result.model.clone(),
            created_at,
        };
        self.store.append(record.clone())?;
        tracing::debug!(
            message_id = %record.id,
            conversation_id = %record.conversation_id,
            created_at = %record.created_at,
            "reply reconciled into transcript"
        );
        Ok(Splice {
            placeholder_id: placeholder.id(),
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::ReplyMode;
    use crate::state::InMemoryTranscript;
    use chrono::TimeZone;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn at(millis: i64, extra_nanos: u32) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap() + Duration::nanoseconds(i64::from(extra_nanos))
    }

    fn result(content: &str) -> ReplyResult {
        ReplyResult {
            content: content.to_string(),
            reasoning: String::new(),
            model: "m".to_string(),
            mode: ReplyMode::Streamed,
            attempts: 1,
        }
    }

    #[test]
    fn timestamp_is_truncated_to_millis() {
        assert_eq!(next_timestamp(at(1_000, 456_789), None), at(1_000, 0));
    }

    #[test]
    fn timestamp_moves_past_latest() {
        assert_eq!(next_timestamp(at(1_000, 0), Some(at(1_000, 0))), at(1_001, 0));
        assert_eq!(next_timestamp(at(900, 0), Some(at(1_000, 250))), at(1_001, 0));
        assert_eq!(next_timestamp(at(1_002, 0), Some(at(1_000, 0))), at(1_002, 0));
    }

    #[test]
    fn same_millisecond_replies_get_increasing_timestamps() {
        let reconciler =
            TranscriptReconciler::with_clock(InMemoryTranscript::new(), FixedClock(at(5_000, 10)));
        let first = reconciler
            .reconcile(PlaceholderMessage::new(uuid::Uuid::from_u128(1), "c", true), &result("a"))
            .unwrap();
        let second = reconciler
            .reconcile(PlaceholderMessage::new(uuid::Uuid::from_u128(2), "c", true), &result("b"))
            .unwrap();
        assert!(second.record.created_at > first.record.created_at);
        assert_eq!(reconciler.store().len("c"), 2);
    }

    #[test]
    fn record_takes_placeholder_id_and_result_content() {
        let mut placeholder = PlaceholderMessage::new(uuid::Uuid::from_u128(9), "conv", true);
        placeholder.append(&crate::protocol::delta::DeltaEvent::content("partial"));
        let reconciler = TranscriptReconciler::new(InMemoryTranscript::new());
        let splice = reconciler.reconcile(placeholder, &result("final")).unwrap();
        assert_eq!(splice.placeholder_id, uuid::Uuid::from_u128(9));
        assert_eq!(splice.record.id, uuid::Uuid::from_u128(9));
        assert_eq!(splice.record.content, "final");
        assert_eq!(splice.record.role, Role::Assistant);
    }

    #[test]
    fn splice_replaces_placeholder_entry() {
        let placeholder_id = uuid::Uuid::from_u128(3);
        let stale = MessageRecord {
            id: placeholder_id,
            conversation_id: "c".into(),
            role: Role::Assistant,
            content: "partial".into(),
            reasoning: String::new(),
            model: "m".into(),
            created_at: at(0, 0),
        };
        let mut view = vec![stale.clone()];
        let record = MessageRecord {
            content: "final".into(),
            ..stale
        };
        Splice {
            placeholder_id,
            record,
        }
        .apply(&mut view);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].content, "final");
    }
}
