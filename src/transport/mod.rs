mod http_transport;
mod retry_policy;

pub use http_transport::HttpTransport;
pub use retry_policy::RetryPolicy;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::ReplyError;
use crate::protocol::request::ReplyRequest;

/// Raw response body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ReplyError>> + Send>>;

/// One encoded request ready for the wire.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub body: Bytes,
    /// Whether the body asks for an event stream.
    pub stream: bool,
}

impl UpstreamRequest {
    /// Encode a reply request.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::Internal`] if the body cannot be serialized.
    pub fn from_reply(request: &ReplyRequest) -> Result<Self, ReplyError> {
        Ok(Self {
            body: request.encode_body()?,
            stream: request.stream(),
        })
    }
}

/// Response body: fully read, or still arriving.
pub enum ResponseBody {
    Buffered(Bytes),
    Stream(ByteStream),
}

impl ResponseBody {
    /// Read the whole body into memory.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a streaming body.
    pub async fn collect(self) -> Result<Bytes, ReplyError> {
        match self {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Stream(mut stream) => {
                let mut out = Vec::new();
                while let Some(chunk) = stream.next().await {
                    out.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(out))
            }
        }
    }

    /// View the body as a chunk stream. A buffered body is a single chunk.
    #[must_use]
    pub fn into_stream(self) -> ByteStream {
        match self {
            ResponseBody::Buffered(bytes) => {
                Box::pin(futures_util::stream::once(async move { Ok(bytes) }))
            }
            ResponseBody::Stream(stream) => stream,
        }
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Status, headers and body of one upstream response.
#[derive(Debug)]
pub struct TransportResponse {
    pub status: http::StatusCode,
    pub headers: http::HeaderMap,
    pub body: ResponseBody,
}

impl TransportResponse {
    /// Whether the response declares `text/event-stream`.
    #[must_use]
    pub fn is_event_stream(&self) -> bool {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| {
                value
                    .split(';')
                    .next()
                    .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/event-stream"))
            })
    }
}

/// Issues one HTTP request and hands back the response.
///
/// Implementations own connection handling, authentication headers and any
/// wire-level retries. Non-2xx statuses are returned as responses, not
/// errors; only failures to obtain a response are `Err`.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: UpstreamRequest,
    ) -> impl Future<Output = Result<TransportResponse, ReplyError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn send(
        &self,
        request: UpstreamRequest,
    ) -> impl Future<Output = Result<TransportResponse, ReplyError>> + Send {
        self.as_ref().send(request)
    }
}
