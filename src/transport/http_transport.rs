use std::time::Duration;

use futures_util::StreamExt;
use http::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};

use crate::config::EndpointConfig;
use crate::error::ReplyError;

use super::retry_policy::RetryPolicy;
use super::{ResponseBody, Transport, TransportResponse, UpstreamRequest};

const EVENT_STREAM: HeaderValue = HeaderValue::from_static("text/event-stream");
const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

fn build_reqwest_client(config: &EndpointConfig) -> Result<reqwest::Client, ReplyError> {
    let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
    };
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(config.timeout));

    if let Some(proxy_url) = config.proxy.as_deref() {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| ReplyError::Config(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else if !config.http_use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| ReplyError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Flatten a reqwest error and its sources into one message.
fn error_chain_message(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Chat-completions transport over reqwest.
///
/// Sends every request to `{base_url}/chat/completions` with bearer auth.
/// Retries 429/503/529 and transient connection failures according to its
/// [`RetryPolicy`]; every other status comes back as a response.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: url::Url,
    headers: http::HeaderMap,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Build a transport from endpoint settings.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::Config`] for an unusable URL, key or proxy, and
    /// [`ReplyError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &EndpointConfig) -> Result<Self, ReplyError> {
        let url = url::Url::parse(&config.chat_completions_url())
            .map_err(|err| ReplyError::Config(format!("Invalid base_url: {err}")))?;
        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| ReplyError::Config("api_key contains invalid header characters".into()))?;
        authorization.set_sensitive(true);

        let mut headers = http::HeaderMap::with_capacity(3);
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(CONTENT_TYPE, APPLICATION_JSON);

        Ok(Self {
            client: build_reqwest_client(config)?,
            url,
            headers,
            retry: RetryPolicy::new(config.retry_max_attempts),
        })
    }

    /// Replace the wire-level retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    async fn execute_with_retry(
        &self,
        headers: &http::HeaderMap,
        body: &bytes::Bytes,
    ) -> Result<reqwest::Response, ReplyError> {
        let mut attempt = 0;
        loop {
            let mut request = reqwest::Request::new(http::Method::POST, self.url.clone());
            *request.headers_mut() = headers.clone();
            *request.body_mut() = Some(reqwest::Body::from(body.clone()));

            match self.client.execute(request).await {
                Ok(response) => {
                    let Some(delay) =
                        self.retry
                            .delay_for_status(response.status(), response.headers(), attempt)
                    else {
                        return Ok(response);
                    };
                    tracing::debug!(
                        status = response.status().as_u16(),
                        retry_attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        "retrying upstream request after retriable status"
                    );
                    drop(response);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    let message = error_chain_message(&err);
                    let Some(delay) = self.retry.delay_for_transport_error(&message, attempt)
                    else {
                        return Err(ReplyError::Transport(message));
                    };
                    tracing::debug!(
                        retry_attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        error = %message,
                        "retrying upstream request after transport error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn execute(&self, request: UpstreamRequest) -> Result<TransportResponse, ReplyError> {
        let mut headers = self.headers.clone();
        headers.insert(
            ACCEPT,
            if request.stream {
                EVENT_STREAM
            } else {
                APPLICATION_JSON
            },
        );

        let response = self.execute_with_retry(&headers, &request.body).await?;
        let status = response.status();
        let headers = response.headers().clone();

        let body = if request.stream && status.is_success() {
            ResponseBody::Stream(Box::pin(response.bytes_stream().map(|chunk| {
                chunk.map_err(|err| ReplyError::Transport(error_chain_message(&err)))
            })))
        } else {
            let bytes = response
                .bytes()
                .await
                .map_err(|err| ReplyError::Transport(error_chain_message(&err)))?;
            ResponseBody::Buffered(bytes)
        };

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        request: UpstreamRequest,
    ) -> impl std::future::Future<Output = Result<TransportResponse, ReplyError>> + Send {
        self.execute(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_targets_chat_completions() {
        let transport =
            HttpTransport::new(&EndpointConfig::new("https://api.example.com/v1/", "sk-test"))
                .unwrap();
        assert_eq!(
            transport.url().as_str(),
            "https://api.example.com/v1/chat/completions"
        );
        let auth = transport.headers.get(AUTHORIZATION).unwrap();
        assert!(auth.is_sensitive());
        assert_eq!(auth.to_str().unwrap(), "Bearer sk-test");
    }

    #[test]
    fn test_new_rejects_key_with_newline() {
        let config = EndpointConfig::new("https://api.example.com/v1", "sk\ntest");
        assert!(matches!(
            HttpTransport::new(&config),
            Err(ReplyError::Config(_))
        ));
    }

    #[test]
    fn test_retry_policy_follows_config() {
        let mut config = EndpointConfig::new("http://127.0.0.1:9", "k");
        config.retry_max_attempts = 0;
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.retry.max_attempts(), 0);
    }
}
