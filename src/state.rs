mod request_id;
mod transcript;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

pub use request_id::RequestIdGenerator;
pub use transcript::{InMemoryTranscript, TranscriptStore};

/// Process-wide "extended reasoning enabled" preference.
pub trait ReasoningFlag: Send + Sync {
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);
}

impl<T: ReasoningFlag> ReasoningFlag for Arc<T> {
    fn is_enabled(&self) -> bool {
        self.as_ref().is_enabled()
    }

    fn set_enabled(&self, enabled: bool) {
        self.as_ref().set_enabled(enabled);
    }
}

/// Cloneable flag; clones share one value.
#[derive(Debug, Clone, Default)]
pub struct SharedReasoningFlag {
    enabled: Arc<AtomicBool>,
}

impl SharedReasoningFlag {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }
}

impl ReasoningFlag for SharedReasoningFlag {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}

/// Fire-and-forget user-facing notice.
pub trait NoticeSink: Send + Sync {
    fn notify(&self, message: &str);
}

impl<T: NoticeSink> NoticeSink for Arc<T> {
    fn notify(&self, message: &str) {
        self.as_ref().notify(message);
    }
}

/// Logs notices at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNoticeSink;

impl NoticeSink for TracingNoticeSink {
    fn notify(&self, message: &str) {
        tracing::info!(notice = message, "user notice");
    }
}

/// Keeps every notice; clones share one list.
#[derive(Debug, Clone, Default)]
pub struct RecordingNoticeSink {
    notices: Arc<Mutex<Vec<String>>>,
}

impl RecordingNoticeSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.notices.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notices.lock().is_empty()
    }
}

impl NoticeSink for RecordingNoticeSink {
    fn notify(&self, message: &str) {
        self.notices.lock().push(message.to_owned());
    }
}
