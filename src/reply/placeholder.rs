use crate::protocol::delta::DeltaEvent;

/// The in-flight assistant message shown while a reply streams.
///
/// Fragments are mirrored only while the reply is streaming. Content and
/// reasoning only ever grow. Once superseded by a fallback the placeholder
/// never streams again; the final text then comes from the reply result,
/// not from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMessage {
    id: uuid::Uuid,
    conversation_id: String,
    content: String,
    reasoning: String,
    streaming: bool,
    superseded: bool,
}

impl PlaceholderMessage {
    #[must_use]
    pub fn new(id: uuid::Uuid, conversation_id: impl Into<String>, streaming: bool) -> Self {
        Self {
            id,
            conversation_id: conversation_id.into(),
            content: String::new(),
            reasoning: String::new(),
            streaming,
            superseded: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Partial content mirrored so far.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Partial reasoning mirrored so far.
    #[must_use]
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Append a fragment. Ignored once the placeholder stopped streaming.
    pub fn append(&mut self, delta: &DeltaEvent) {
        if !self.streaming {
            return;
        }
        if let Some(content) = delta.content.as_deref() {
            self.content.push_str(content);
        }
        if let Some(reasoning) = delta.reasoning.as_deref() {
            self.reasoning.push_str(reasoning);
        }
    }

    /// True once a fallback replaced the streamed attempt.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.superseded
    }

    /// An event stream started. No effect after the placeholder was superseded.
    pub(crate) fn begin_streaming(&mut self) {
        self.streaming = !self.superseded;
    }

    pub(crate) fn supersede(&mut self) {
        self.streaming = false;
        self.superseded = true;
    }

    pub(crate) fn stop_streaming(&mut self) {
        self.streaming = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_grows_content_and_reasoning() {
        let mut placeholder = PlaceholderMessage::new(uuid::Uuid::from_u128(7), "c", true);
        placeholder.append(&DeltaEvent::reasoning("think"));
        placeholder.append(&DeltaEvent::content("Hi"));
        placeholder.append(&DeltaEvent::content(" there"));
        assert_eq!(placeholder.content(), "Hi there");
        assert_eq!(placeholder.reasoning(), "think");
    }

    #[test]
    fn stopped_placeholder_ignores_fragments() {
        let mut placeholder = PlaceholderMessage::new(uuid::Uuid::from_u128(7), "c", true);
        placeholder.append(&DeltaEvent::content("partial"));
        placeholder.stop_streaming();
        placeholder.append(&DeltaEvent::content(" more"));
        assert_eq!(placeholder.content(), "partial");
        assert!(!placeholder.is_streaming());
    }

    #[test]
    fn mirrors_only_after_stream_begins() {
        let mut placeholder = PlaceholderMessage::new(uuid::Uuid::from_u128(7), "c", false);
        placeholder.append(&DeltaEvent::content("early"));
        assert_eq!(placeholder.content(), "");
        placeholder.begin_streaming();
        placeholder.append(&DeltaEvent::content("live"));
        assert_eq!(placeholder.content(), "live");
    }

    #[test]
    fn superseded_placeholder_does_not_resume() {
        let mut placeholder = PlaceholderMessage::new(uuid::Uuid::from_u128(7), "c", false);
        placeholder.begin_streaming();
        placeholder.append(&DeltaEvent::content("partial"));
        placeholder.supersede();
        placeholder.begin_streaming();
        placeholder.append(&DeltaEvent::content(" again"));
        assert_eq!(placeholder.content(), "partial");
        assert!(placeholder.is_superseded());
        assert!(!placeholder.is_streaming());
    }
}
