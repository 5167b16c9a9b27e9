/// SSE (Server-Sent Events) record decoder and stream utilities.
///
/// Turns an arbitrarily chunked byte stream into complete event records.
/// Chunk boundaries may fall inside a multi-byte character, inside a line, or
/// between the two halves of a blank-line terminator; none of that is visible
/// to the consumer.
use bytes::Bytes;
use futures_util::Stream;
use memchr::memchr_iter;
use smallvec::SmallVec;
use std::pin::Pin;

use crate::error::ReplyError;

/// Payload of the end-of-stream sentinel record.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One complete event record: the joined, trimmed `data:` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRecord {
    pub data: String,
}

impl EventRecord {
    #[must_use]
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    /// True for the `[DONE]` sentinel.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.data == DONE_SENTINEL
    }
}

struct PendingRecords {
    records: SmallVec<[EventRecord; 8]>,
    head: usize,
}

impl PendingRecords {
    #[inline]
    fn new() -> Self {
        Self {
            records: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<EventRecord> {
        if self.head >= self.records.len() {
            return None;
        }
        let record = std::mem::take(&mut self.records[self.head]);
        self.head += 1;
        if self.head == self.records.len() {
            self.records.clear();
            self.head = 0;
        }
        Some(record)
    }

    #[inline]
    fn extend_from_vec(&mut self, parsed: &mut Vec<EventRecord>) {
        if parsed.is_empty() {
            return;
        }
        self.records.extend(parsed.drain(..));
    }
}

// ---------------------------------------------------------------------------
// FrameDecoder: incremental record decoder
// ---------------------------------------------------------------------------

/// Incremental SSE record decoder.
///
/// Feed it raw bytes in any split and it yields fully-assembled
/// [`EventRecord`]s. Undecoded trailing bytes (a partial UTF-8 sequence, a
/// partial line, a record still waiting for its blank line) are buffered
/// across calls.
///
/// Rules applied per record:
/// - only `data:` lines count; the prefix and one following space are
///   stripped and multiple lines are joined with `\n`
/// - a blank line (`\n\n` or `\r\n\r\n`) terminates the record
/// - lines starting with `:` are comments; other fields are ignored
/// - the joined payload is trimmed
pub struct FrameDecoder {
    buffer: String,
    read_offset: usize,
    data_buffer: String,
    has_data: bool,
    utf8_remainder: Vec<u8>,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
            data_buffer: String::new(),
            has_data: false,
            utf8_remainder: Vec::new(),
        }
    }

    /// Feed raw bytes and append complete records into `out`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::Decode`] when the bytes are invalid UTF-8. An
    /// incomplete trailing sequence is not an error; it is held until the
    /// next call.
    pub fn feed_bytes(
        &mut self,
        chunk: &[u8],
        out: &mut Vec<EventRecord>,
    ) -> Result<(), ReplyError> {
        if self.utf8_remainder.is_empty() {
            let tail = self.feed_valid_prefix(chunk, out)?;
            self.utf8_remainder.extend_from_slice(tail);
            return Ok(());
        }

        let mut pending = std::mem::take(&mut self.utf8_remainder);
        pending.extend_from_slice(chunk);
        let tail_len = self.feed_valid_prefix(&pending, out)?.len();
        let consumed = pending.len() - tail_len;
        pending.drain(..consumed);
        self.utf8_remainder = pending;
        Ok(())
    }

    fn feed_valid_prefix<'a>(
        &mut self,
        bytes: &'a [u8],
        out: &mut Vec<EventRecord>,
    ) -> Result<&'a [u8], ReplyError> {
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                self.feed_str(text, out);
                Ok(&[])
            }
            Err(err) if err.error_len().is_some() => Err(ReplyError::Decode(format!(
                "Invalid UTF-8 in event stream at byte {}",
                err.valid_up_to()
            ))),
            Err(err) => {
                let (valid, tail) = bytes.split_at(err.valid_up_to());
                if let Ok(text) = std::str::from_utf8(valid) {
                    self.feed_str(text, out);
                }
                Ok(tail)
            }
        }
    }

    /// Feed already-decoded text and append complete records into `out`.
    pub fn feed_str(&mut self, chunk: &str, out: &mut Vec<EventRecord>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let bytes = self.buffer.as_bytes();
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            Self::process_line(line, &mut self.data_buffer, &mut self.has_data, out);
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    fn process_line(
        line: &str,
        data_buffer: &mut String,
        has_data: &mut bool,
        records: &mut Vec<EventRecord>,
    ) {
        if line.is_empty() {
            if *has_data {
                let data = std::mem::take(data_buffer);
                let trimmed = data.trim();
                let data = if trimmed.len() == data.len() {
                    data
                } else {
                    trimmed.to_owned()
                };
                records.push(EventRecord { data });
                *has_data = false;
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if *has_data {
                data_buffer.push('\n');
            } else {
                *has_data = true;
            }
            data_buffer.push_str(value);
        }
    }

    /// Bytes currently held back waiting for more input.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        (self.buffer.len() - self.read_offset)
            + self.data_buffer.len()
            + self.utf8_remainder.len()
    }

    /// Flush at end of input. An unterminated record is discarded, never
    /// emitted. Returns the number of bytes dropped.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffered_len();
        if discarded > 0 || self.has_data {
            tracing::debug!(
                discarded_bytes = discarded,
                "dropping unterminated event record at end of stream"
            );
        }
        self.buffer.clear();
        self.read_offset = 0;
        self.data_buffer.clear();
        self.has_data = false;
        self.utf8_remainder.clear();
        discarded
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a complete buffer in one call, discarding any unterminated tail.
///
/// # Errors
///
/// Returns [`ReplyError::Decode`] on invalid UTF-8.
pub fn decode_all(bytes: &[u8]) -> Result<Vec<EventRecord>, ReplyError> {
    let mut decoder = FrameDecoder::new();
    let mut out = Vec::new();
    decoder.feed_bytes(bytes, &mut out)?;
    decoder.finish();
    Ok(out)
}

// ---------------------------------------------------------------------------
// Stream utility
// ---------------------------------------------------------------------------

struct RecordStreamState<S> {
    stream: Pin<Box<S>>,
    decoder: FrameDecoder,
    parsed: Vec<EventRecord>,
    pending: PendingRecords,
    finished: bool,
}

/// Split a byte stream into event records using [`FrameDecoder`].
///
/// A transport error or invalid UTF-8 is yielded once as `Err` and ends the
/// stream. At end of input any unterminated record is dropped.
pub fn sse_record_stream<S>(
    byte_stream: S,
) -> impl Stream<Item = Result<EventRecord, ReplyError>> + Send
where
    S: Stream<Item = Result<Bytes, ReplyError>> + Send + 'static,
{
    use futures_util::StreamExt;

    let state = RecordStreamState {
        stream: Box::pin(byte_stream),
        decoder: FrameDecoder::new(),
        parsed: Vec::with_capacity(8),
        pending: PendingRecords::new(),
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(record) = state.pending.pop_front() {
                return Some((Ok(record), state));
            }
            if state.finished {
                return None;
            }

            match state.stream.as_mut().next().await {
                Some(Ok(chunk)) => {
                    if let Err(err) = state.decoder.feed_bytes(&chunk, &mut state.parsed) {
                        state.finished = true;
                        state.parsed.clear();
                        return Some((Err(err), state));
                    }
                    state.pending.extend_from_vec(&mut state.parsed);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.decoder.finish();
                    state.finished = true;
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
