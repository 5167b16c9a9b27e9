use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ReplyError;

/// Role tag of a prompt segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged piece of the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSegment {
    pub role: Role,
    pub content: String,
}

impl PromptSegment {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single logical reply request.
///
/// Built once with the `with_*` methods and then treated as immutable: the
/// retry paths derive new requests through [`ReplyRequest::without_reasoning`]
/// and [`ReplyRequest::without_streaming`] instead of mutating the original.
/// Prompt segments are shared, so derived requests are cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyRequest {
    conversation_id: String,
    model: String,
    segments: Arc<[PromptSegment]>,
    temperature: Option<f64>,
    top_p: Option<f64>,
    extended_reasoning: bool,
    stream: bool,
}

impl ReplyRequest {
    /// New streaming request with reasoning off and provider-default sampling.
    #[must_use]
    pub fn new(
        conversation_id: impl Into<String>,
        model: impl Into<String>,
        segments: Vec<PromptSegment>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            model: model.into(),
            segments: segments.into(),
            temperature: None,
            top_p: None,
            extended_reasoning: false,
            stream: true,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    #[must_use]
    pub fn with_extended_reasoning(mut self, enabled: bool) -> Self {
        self.extended_reasoning = enabled;
        self
    }

    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Equivalent request with extended reasoning forced off.
    #[must_use]
    pub fn without_reasoning(&self) -> Self {
        Self {
            extended_reasoning: false,
            ..self.clone()
        }
    }

    /// Equivalent request that asks for a single JSON document.
    #[must_use]
    pub fn without_streaming(&self) -> Self {
        Self {
            stream: false,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn segments(&self) -> &[PromptSegment] {
        &self.segments
    }

    #[must_use]
    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    #[must_use]
    pub fn top_p(&self) -> Option<f64> {
        self.top_p
    }

    #[must_use]
    pub fn extended_reasoning(&self) -> bool {
        self.extended_reasoning
    }

    #[must_use]
    pub fn stream(&self) -> bool {
        self.stream
    }

    /// Encode the chat-completions request body.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::Internal`] if serialization fails.
    pub fn encode_body(&self) -> Result<bytes::Bytes, ReplyError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: &self.segments[..],
            stream: self.stream,
            temperature: self.temperature,
            top_p: self.top_p,
            reasoning: self
                .extended_reasoning
                .then_some(ReasoningToggle { enabled: true }),
        };
        serde_json::to_vec(&body)
            .map(bytes::Bytes::from)
            .map_err(|err| ReplyError::Internal(format!("Failed to encode request body: {err}")))
    }
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [PromptSegment],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<ReasoningToggle>,
}

#[derive(Serialize)]
struct ReasoningToggle {
    enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sample() -> ReplyRequest {
        ReplyRequest::new(
            "conv-1",
            "deepseek/deepseek-r1",
            vec![
                PromptSegment::system("You are a friendly companion."),
                PromptSegment::user("How was my week?"),
            ],
        )
    }

    #[test]
    fn encode_body_minimal_shape() {
        let body = sample().encode_body().expect("encode");
        let json: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["model"], "deepseek/deepseek-r1");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "How was my week?");
        assert!(json.get("temperature").is_none());
        assert!(json.get("reasoning").is_none());
    }

    #[test]
    fn encode_body_with_sampling_and_reasoning() {
        let request = sample()
            .with_temperature(0.7)
            .with_top_p(0.9)
            .with_extended_reasoning(true);
        let json: Value = serde_json::from_slice(&request.encode_body().unwrap()).unwrap();
        assert_eq!(json["temperature"], 0.7);
        assert_eq!(json["top_p"], 0.9);
        assert_eq!(json["reasoning"]["enabled"], true);
    }

    #[test]
    fn derived_requests_keep_everything_else() {
        let original = sample().with_extended_reasoning(true).with_temperature(0.2);
        let retried = original.without_reasoning();
        assert!(!retried.extended_reasoning());
        assert!(retried.stream());
        assert_eq!(retried.temperature(), Some(0.2));
        assert_eq!(retried.segments(), original.segments());

        let fallback = original.without_streaming();
        assert!(!fallback.stream());
        assert!(fallback.extended_reasoning());
        assert!(original.stream());
    }
}
