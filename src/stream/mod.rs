pub mod accumulator;
pub mod sse;

pub use accumulator::{RecordOutcome, StreamAccumulator, StreamTotals};
pub use sse::{sse_record_stream, EventRecord, FrameDecoder};

use crate::protocol::delta::DeltaEvent;

/// Receives incremental output while a reply is in flight.
///
/// Callbacks run synchronously inside the read loop and must not block.
/// Closures taking `&DeltaEvent` are observers.
pub trait ReplyObserver {
    /// A new fragment arrived. Carries only the fragment, never the total.
    fn on_delta(&mut self, delta: &DeltaEvent);

    /// Everything delivered so far is superseded by a fresh attempt.
    /// Observers rendering partial text must clear it rather than append.
    fn on_superseded(&mut self) {}
}

impl<F> ReplyObserver for F
where
    F: FnMut(&DeltaEvent),
{
    fn on_delta(&mut self, delta: &DeltaEvent) {
        self(delta);
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ReplyObserver for NoopObserver {
    fn on_delta(&mut self, _delta: &DeltaEvent) {}
}
