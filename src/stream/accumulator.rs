use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::ReplyError;
use crate::protocol::delta::DeltaExtractor;

use super::sse::{sse_record_stream, EventRecord};
use super::ReplyObserver;

/// Running totals of one streamed reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamTotals {
    pub content: String,
    pub reasoning: String,
    /// Last model id reported by the stream.
    pub model: Option<String>,
    /// Records that produced a delta.
    pub records: usize,
    /// Records skipped as empty or malformed.
    pub skipped: usize,
    /// Whether the stream ended with the `[DONE]` sentinel.
    pub saw_sentinel: bool,
}

/// What the read loop should do after a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Continue,
    Done,
}

/// Read loop over decoded records.
///
/// Each record is run through the extractor, its fragments are appended to
/// the totals and the observer sees the fragment immediately.
#[derive(Debug, Clone, Default)]
pub struct StreamAccumulator {
    extractor: DeltaExtractor,
    totals: StreamTotals,
}

impl StreamAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::with_extractor(DeltaExtractor::streaming())
    }

    #[must_use]
    pub fn with_extractor(extractor: DeltaExtractor) -> Self {
        Self {
            extractor,
            totals: StreamTotals::default(),
        }
    }

    #[must_use]
    pub fn totals(&self) -> &StreamTotals {
        &self.totals
    }

    /// Apply one record.
    pub fn accept<O>(&mut self, record: &EventRecord, observer: &mut O) -> RecordOutcome
    where
        O: ReplyObserver + ?Sized,
    {
        if record.is_done() {
            self.totals.saw_sentinel = true;
            return RecordOutcome::Done;
        }
        if record.data.is_empty() {
            self.totals.skipped += 1;
            return RecordOutcome::Continue;
        }

        let delta = match self.extractor.extract_str(&record.data) {
            Ok(delta) => delta,
            Err(err) => {
                self.totals.skipped += 1;
                tracing::warn!(
                    error = %err,
                    payload_len = record.data.len(),
                    "skipping malformed stream record"
                );
                return RecordOutcome::Continue;
            }
        };

        self.totals.records += 1;
        if let Some(content) = delta.content.as_deref() {
            self.totals.content.push_str(content);
        }
        if let Some(reasoning) = delta.reasoning.as_deref() {
            self.totals.reasoning.push_str(reasoning);
        }
        if let Some(model) = delta.model.as_deref() {
            if self.totals.model.as_deref() != Some(model) {
                self.totals.model = Some(model.to_owned());
            }
        }
        if !delta.is_empty() {
            observer.on_delta(&delta);
        }
        RecordOutcome::Continue
    }

    /// Consume records until the sentinel or the end of the stream.
    ///
    /// # Errors
    ///
    /// Propagates the first transport or decode error from the stream.
    pub async fn run<S, O>(mut self, records: S, observer: &mut O) -> Result<StreamTotals, ReplyError>
    where
        S: Stream<Item = Result<EventRecord, ReplyError>>,
        O: ReplyObserver + ?Sized,
    {
        let mut records = std::pin::pin!(records);
        while let Some(record) = records.next().await {
            if self.accept(&record?, observer) == RecordOutcome::Done {
                break;
            }
        }
        tracing::debug!(
            records = self.totals.records,
            skipped = self.totals.skipped,
            sentinel = self.totals.saw_sentinel,
            "stream consumed"
        );
        Ok(self.totals)
    }

    /// Decode a raw byte stream and consume it.
    ///
    /// # Errors
    ///
    /// Propagates transport errors and invalid UTF-8.
    pub async fn run_bytes<S, O>(
        self,
        byte_stream: S,
        observer: &mut O,
    ) -> Result<StreamTotals, ReplyError>
    where
        S: Stream<Item = Result<Bytes, ReplyError>> + Send + 'static,
        O: ReplyObserver + ?Sized,
    {
        self.run(sse_record_stream(byte_stream), observer).await
    }
}
