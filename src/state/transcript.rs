use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::ReplyError;
use crate::reply::MessageRecord;

/// Durable conversation log, owned outside this crate.
pub trait TranscriptStore: Send + Sync {
    /// Timestamp of the newest entry in the conversation, if any.
    fn latest_timestamp(&self, conversation_id: &str) -> Option<DateTime<Utc>>;

    /// Append a finalized message.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::Storage`] when the record cannot be stored.
    fn append(&self, record: MessageRecord) -> Result<(), ReplyError>;
}

impl<T: TranscriptStore> TranscriptStore for Arc<T> {
    fn latest_timestamp(&self, conversation_id: &str) -> Option<DateTime<Utc>> {
        self.as_ref().latest_timestamp(conversation_id)
    }

    fn append(&self, record: MessageRecord) -> Result<(), ReplyError> {
        self.as_ref().append(record)
    }
}

/// Transcript kept in memory, keyed by conversation.
#[derive(Debug, Default)]
pub struct InMemoryTranscript {
    conversations: RwLock<HashMap<String, Vec<MessageRecord>>>,
}

impl InMemoryTranscript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one conversation, oldest first.
    #[must_use]
    pub fn messages(&self, conversation_id: &str) -> Vec<MessageRecord> {
        self.conversations
            .read()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self, conversation_id: &str) -> usize {
        self.conversations
            .read()
            .get(conversation_id)
            .map_or(0, Vec::len)
    }
}

impl TranscriptStore for InMemoryTranscript {
    fn latest_timestamp(&self, conversation_id: &str) -> Option<DateTime<Utc>> {
        self.conversations
            .read()
            .get(conversation_id)?
            .iter()
            .map(|record| record.created_at)
            .max()
    }

    fn append(&self, record: MessageRecord) -> Result<(), ReplyError> {
        let mut conversations = self.conversations.write();
        let messages = conversations
            .entry(record.conversation_id.clone())
            .or_default();
        if messages.iter().any(|existing| existing.id == record.id) {
            return Err(ReplyError::Storage(format!(
                "message {} already exists in conversation {}",
                record.id, record.conversation_id
            )));
        }
        messages.push(record);
        Ok(())
    }
}
