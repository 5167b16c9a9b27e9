//! Request lifecycle of one reply.
//!
//! The coordinator walks an explicit state machine:
//!
//! ```text
//! Requesting ─┬─► Streaming ────┬─► Settled
//!      ▲      └─► NonStreaming ─┘
//!      └──── quota retry / stream fallback
//! ```
//!
//! Two recovery edges lead back to `Requesting`. They share one
//! [`RetryBudget`], so a reply makes at most two physical requests:
//!
//! - quota: a 402 for a request with extended reasoning turns the
//!   process-wide reasoning flag off, sends one notice and reissues the
//!   request without reasoning.
//! - fallback: a transport or decode failure of a streaming request reissues
//!   it without streaming. The observer is told its partial text is
//!   superseded and the document result replaces it.
//!
//! Once either edge has fired, a failure the other edge would have handled
//! is terminal.

use std::time::Instant;

use crate::config::ReplyConfig;
use crate::error::{sanitize_upstream_error, ReplyError};
use crate::observability;
use crate::protocol::delta::{DeltaEvent, DeltaExtractor};
use crate::protocol::request::ReplyRequest;
use crate::protocol::response_decoder::decode_document_with;
use crate::state::{NoticeSink, ReasoningFlag, RequestIdGenerator};
use crate::stream::{ReplyObserver, StreamAccumulator};
use crate::transport::{ResponseBody, Transport, UpstreamRequest};

use super::placeholder::PlaceholderMessage;
use super::{ReplyMode, ReplyResult};

const PAYMENT_REQUIRED: u16 = 402;

/// Text settings applied when a reply settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplySettings {
    /// Substituted when the final content is blank.
    pub empty_reply_text: String,
    /// Sent to the notice sink when the quota edge fires.
    pub quota_notice: String,
}

impl ReplySettings {
    #[must_use]
    pub fn from_config(config: &ReplyConfig) -> Self {
        Self {
            empty_reply_text: config.empty_reply_text.clone(),
            quota_notice: config.quota_notice.clone(),
        }
    }
}

impl Default for ReplySettings {
    fn default() -> Self {
        Self::from_config(&ReplyConfig::default())
    }
}

/// Retries still available to one reply. Both recovery edges draw on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u8,
}

impl RetryBudget {
    /// A single retry, taken by whichever edge fires first.
    #[must_use]
    pub const fn once() -> Self {
        Self { remaining: 1 }
    }

    /// Consume the retry. False when already used.
    pub fn take(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::once()
    }
}

enum CoordinatorState {
    Requesting(ReplyRequest),
    Streaming(ReplyRequest, ResponseBody),
    NonStreaming(ReplyRequest, ResponseBody),
    Settled(Result<(ReplyRequest, ReplyResult), ReplyError>),
}

impl CoordinatorState {
    fn name(&self) -> &'static str {
        match self {
            CoordinatorState::Requesting(_) => "requesting",
            CoordinatorState::Streaming(..) => "streaming",
            CoordinatorState::NonStreaming(..) => "non_streaming",
            CoordinatorState::Settled(_) => "settled",
        }
    }
}

/// Mirrors fragments into the placeholder before the caller's observer sees them.
struct PlaceholderMirror<'a, O: ?Sized> {
    placeholder: &'a mut PlaceholderMessage,
    observer: &'a mut O,
}

impl<O: ReplyObserver + ?Sized> ReplyObserver for PlaceholderMirror<'_, O> {
    fn on_delta(&mut self, delta: &DeltaEvent) {
        self.placeholder.append(delta);
        self.observer.on_delta(delta);
    }

    fn on_superseded(&mut self) {
        self.placeholder.supersede();
        self.observer.on_superseded();
    }
}

/// Drives one reply at a time against a [`Transport`].
///
/// `issue_reply` takes `&mut self`, so a coordinator never has two replies
/// outstanding. Dropping the returned future abandons the request.
pub struct ResponseCoordinator<T, F, N> {
    transport: T,
    reasoning_flag: F,
    notices: N,
    settings: ReplySettings,
    stream_extractor: DeltaExtractor,
    document_extractor: DeltaExtractor,
    ids: RequestIdGenerator,
    placeholder: Option<PlaceholderMessage>,
}

impl<T, F, N> ResponseCoordinator<T, F, N>
where
    T: Transport,
    F: ReasoningFlag,
    N: NoticeSink,
{
    #[must_use]
    pub fn new(transport: T, reasoning_flag: F, notices: N) -> Self {
        Self {
            transport,
            reasoning_flag,
            notices,
            settings: ReplySettings::default(),
            stream_extractor: DeltaExtractor::streaming(),
            document_extractor: DeltaExtractor::document(),
            ids: RequestIdGenerator::new(),
            placeholder: None,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ReplySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the extraction rules for streamed chunks and documents.
    #[must_use]
    pub fn with_extractors(mut self, stream: DeltaExtractor, document: DeltaExtractor) -> Self {
        self.stream_extractor = stream;
        self.document_extractor = document;
        self
    }

    #[must_use]
    pub fn with_id_generator(mut self, ids: RequestIdGenerator) -> Self {
        self.ids = ids;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &ReplySettings {
        &self.settings
    }

    /// Current value of the process-wide reasoning flag.
    #[must_use]
    pub fn reasoning_enabled(&self) -> bool {
        self.reasoning_flag.is_enabled()
    }

    /// The placeholder of the last settled reply, if it has not been taken.
    #[must_use]
    pub fn placeholder(&self) -> Option<&PlaceholderMessage> {
        self.placeholder.as_ref()
    }

    /// Hand the placeholder of the last successful reply to the reconciler.
    pub fn take_placeholder(&mut self) -> Option<PlaceholderMessage> {
        self.placeholder.take()
    }

    /// Issue one logical reply and drive it to a settled result.
    ///
    /// Fragments reach `observer` as they arrive. On success the placeholder
    /// is kept for [`Self::take_placeholder`]; on error it is dropped.
    ///
    /// # Errors
    ///
    /// - [`ReplyError::Status`] for a non-2xx response the edges cannot
    ///   recover, including a 402 after the retry was spent.
    /// - [`ReplyError::Transport`] or [`ReplyError::Decode`] when the
    ///   non-streaming attempt fails too, or when a stream fails after the
    ///   quota retry.
    pub async fn issue_reply<O>(
        &mut self,
        request: ReplyRequest,
        observer: &mut O,
    ) -> Result<ReplyResult, ReplyError>
    where
        O: ReplyObserver + ?Sized,
    {
        let start_time = Instant::now();
        if let Some(abandoned) = self.placeholder.take() {
            tracing::debug!(
                placeholder_id = %abandoned.id(),
                "dropping placeholder that was never reconciled"
            );
        }

        let mut placeholder =
            PlaceholderMessage::new(self.ids.next_id(), request.conversation_id(), false);
        let mut mirror = PlaceholderMirror {
            placeholder: &mut placeholder,
            observer,
        };

        let mut budget = RetryBudget::once();
        let mut attempts = 0_u32;
        let mut state = CoordinatorState::Requesting(request);
        let outcome = loop {
            tracing::trace!(state = state.name(), attempts, "reply state");
            state = match state {
                CoordinatorState::Requesting(request) => {
                    attempts += 1;
                    self.send(request, &mut budget, &mut mirror).await
                }
                CoordinatorState::Streaming(request, body) => {
                    mirror.placeholder.begin_streaming();
                    self.consume_stream(request, body, attempts, &mut budget, &mut mirror)
                        .await
                }
                CoordinatorState::NonStreaming(request, body) => {
                    CoordinatorState::Settled(self.consume_document(request, body, attempts).await)
                }
                CoordinatorState::Settled(outcome) => break outcome,
            };
        };

        match outcome {
            Ok((request, result)) => {
                observability::log_reply_complete(&request, &result, start_time);
                placeholder.stop_streaming();
                self.placeholder = Some(placeholder);
                Ok(result)
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    attempts,
                    elapsed_ms = start_time.elapsed().as_millis(),
                    "reply failed"
                );
                Err(err)
            }
        }
    }

    /// `Requesting`: send and route the response by status and content type.
    async fn send<O>(
        &self,
        request: ReplyRequest,
        budget: &mut RetryBudget,
        observer: &mut O,
    ) -> CoordinatorState
    where
        O: ReplyObserver + ?Sized,
    {
        let upstream = match UpstreamRequest::from_reply(&request) {
            Ok(upstream) => upstream,
            Err(err) => return CoordinatorState::Settled(Err(err)),
        };

        let response = match self.transport.send(upstream).await {
            Ok(response) => response,
            Err(err) => return self.on_stream_failure(request, err, budget, observer),
        };

        let status = response.status;
        if !status.is_success() {
            if status.as_u16() == PAYMENT_REQUIRED
                && request.extended_reasoning()
                && budget.take()
            {
                return self.on_quota_exhausted(&request);
            }
            let message = match response.body.collect().await {
                Ok(body) => sanitize_upstream_error(&body),
                Err(err) => {
                    tracing::debug!(
                        status = status.as_u16(),
                        error = %err,
                        "failed to read upstream error body"
                    );
                    err.to_string()
                }
            };
            return CoordinatorState::Settled(Err(ReplyError::Status {
                status: status.as_u16(),
                message,
            }));
        }

        if response.is_event_stream() {
            CoordinatorState::Streaming(request, response.body)
        } else {
            CoordinatorState::NonStreaming(request, response.body)
        }
    }

    /// Quota edge: reasoning off, one notice, reissue.
    fn on_quota_exhausted(&self, request: &ReplyRequest) -> CoordinatorState {
        tracing::warn!(
            conversation_id = request.conversation_id(),
            model = request.model(),
            "quota exhausted with extended reasoning, retrying without it"
        );
        self.reasoning_flag.set_enabled(false);
        self.notices.notify(&self.settings.quota_notice);
        CoordinatorState::Requesting(request.without_reasoning())
    }

    /// Fallback edge, or settle with the error when it does not apply.
    fn on_stream_failure<O>(
        &self,
        request: ReplyRequest,
        err: ReplyError,
        budget: &mut RetryBudget,
        observer: &mut O,
    ) -> CoordinatorState
    where
        O: ReplyObserver + ?Sized,
    {
        if !(err.is_stream_failure() && request.stream() && budget.take()) {
            return CoordinatorState::Settled(Err(err));
        }
        tracing::warn!(
            conversation_id = request.conversation_id(),
            error = %err,
            "streaming failed, retrying without streaming"
        );
        observer.on_superseded();
        CoordinatorState::Requesting(request.without_streaming())
    }

    /// `Streaming`: run the accumulator until sentinel, end or failure.
    async fn consume_stream<O>(
        &self,
        request: ReplyRequest,
        body: ResponseBody,
        attempts: u32,
        budget: &mut RetryBudget,
        observer: &mut O,
    ) -> CoordinatorState
    where
        O: ReplyObserver + ?Sized,
    {
        let accumulator = StreamAccumulator::with_extractor(self.stream_extractor.clone());
        match accumulator.run_bytes(body.into_stream(), observer).await {
            Ok(totals) => {
                let result = self.finish(
                    &request,
                    totals.content,
                    totals.reasoning,
                    totals.model,
                    ReplyMode::Streamed,
                    attempts,
                );
                CoordinatorState::Settled(Ok((request, result)))
            }
            Err(err) => self.on_stream_failure(request, err, budget, observer),
        }
    }

    /// `NonStreaming`: read and decode one document.
    async fn consume_document(
        &self,
        request: ReplyRequest,
        body: ResponseBody,
        attempts: u32,
    ) -> Result<(ReplyRequest, ReplyResult), ReplyError> {
        let bytes = body.collect().await?;
        let delta = decode_document_with(&self.document_extractor, &bytes)?;
        let result = self.finish(
            &request,
            delta.content.unwrap_or_default(),
            delta.reasoning.unwrap_or_default(),
            delta.model,
            ReplyMode::Document,
            attempts,
        );
        Ok((request, result))
    }

    fn finish(
        &self,
        request: &ReplyRequest,
        content: String,
        reasoning: String,
        model: Option<String>,
        mode: ReplyMode,
        attempts: u32,
    ) -> ReplyResult {
        let content = if content.trim().is_empty() {
            self.settings.empty_reply_text.clone()
        } else {
            content
        };
        ReplyResult {
            content,
            reasoning,
            model: model.unwrap_or_else(|| request.model().to_owned()),
            mode,
            attempts,
        }
    }
}
