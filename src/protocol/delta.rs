//! Extraction of content, reasoning and model id from provider payloads.
//!
//! Providers disagree on where incremental text lives. Instead of a chain of
//! conditionals, each candidate location is a [`FieldRule`] and a
//! [`DeltaExtractor`] evaluates its rules in order, first match wins.
//! Supporting a new provider means appending a rule.

use serde_json::Value;
use smallvec::SmallVec;

/// Field names that may carry reasoning text, in priority order.
pub const REASONING_FIELDS: [&str; 4] = [
    "reasoning",
    "thinking",
    "reasoning_content",
    "thinking_content",
];

/// One unit of incremental output. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaEvent {
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub model: Option<String>,
}

impl DeltaEvent {
    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning: Some(text.into()),
            ..Self::default()
        }
    }

    /// True when the delta carries nothing an observer could use.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.reasoning.is_none() && self.model.is_none()
    }
}

/// Where in the payload a rule looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// `choices[0].delta`
    Delta,
    /// `choices[0].message`
    Message,
    /// `choices[0]`
    Choice,
    /// The payload object itself.
    Payload,
}

/// A candidate location: a field name inside a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRule {
    pub scope: Scope,
    pub field: &'static str,
}

impl FieldRule {
    #[must_use]
    pub const fn new(scope: Scope, field: &'static str) -> Self {
        Self { scope, field }
    }

    /// Resolve the rule against a payload, returning non-empty text.
    #[must_use]
    pub fn apply<'a>(&self, payload: &'a Value) -> Option<TextRef<'a>> {
        let container = resolve_scope(payload, self.scope)?;
        text_of(container.get(self.field)?)
    }
}

/// Text found by a rule: borrowed when the payload holds a plain string,
/// owned when it had to be assembled from parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextRef<'a> {
    Borrowed(&'a str),
    Owned(String),
}

impl TextRef<'_> {
    #[must_use]
    pub fn into_owned(self) -> String {
        match self {
            TextRef::Borrowed(text) => text.to_owned(),
            TextRef::Owned(text) => text,
        }
    }
}

fn resolve_scope(payload: &Value, scope: Scope) -> Option<&Value> {
    match scope {
        Scope::Payload => Some(payload),
        Scope::Choice => payload.get("choices")?.get(0),
        Scope::Delta => payload.get("choices")?.get(0)?.get("delta"),
        Scope::Message => payload.get("choices")?.get(0)?.get("message"),
    }
}

/// Accepts a plain string, an object carrying `text` or `content`, or an
/// array of text parts. Empty results count as no match.
fn text_of(value: &Value) -> Option<TextRef<'_>> {
    match value {
        Value::String(text) if !text.is_empty() => Some(TextRef::Borrowed(text)),
        Value::Object(map) => ["text", "content"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .find(|text| !text.is_empty())
            .map(TextRef::Borrowed),
        Value::Array(parts) => {
            let mut joined = String::new();
            for part in parts {
                let is_text_part = part
                    .get("type")
                    .and_then(Value::as_str)
                    .map_or(true, |kind| kind == "text");
                if !is_text_part {
                    continue;
                }
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    joined.push_str(text);
                }
            }
            (!joined.is_empty()).then_some(TextRef::Owned(joined))
        }
        _ => None,
    }
}

/// Ordered rule sets for content and reasoning.
#[derive(Debug, Clone)]
pub struct DeltaExtractor {
    content_rules: SmallVec<[FieldRule; 4]>,
    reasoning_rules: SmallVec<[FieldRule; 12]>,
}

impl DeltaExtractor {
    /// Rules for streamed chunks (`choices[].delta`).
    #[must_use]
    pub fn streaming() -> Self {
        Self::with_scopes(
            &[
                FieldRule::new(Scope::Delta, "content"),
                FieldRule::new(Scope::Payload, "text"),
            ],
            &[Scope::Delta, Scope::Choice, Scope::Payload],
        )
    }

    /// Rules for a complete non-streaming document (`choices[].message`).
    #[must_use]
    pub fn document() -> Self {
        Self::with_scopes(
            &[
                FieldRule::new(Scope::Message, "content"),
                FieldRule::new(Scope::Choice, "text"),
                FieldRule::new(Scope::Payload, "text"),
            ],
            &[Scope::Message, Scope::Choice, Scope::Payload],
        )
    }

    fn with_scopes(content_rules: &[FieldRule], reasoning_scopes: &[Scope]) -> Self {
        let mut reasoning_rules = SmallVec::new();
        for scope in reasoning_scopes {
            for field in REASONING_FIELDS {
                reasoning_rules.push(FieldRule::new(*scope, field));
            }
        }
        Self {
            content_rules: content_rules.iter().copied().collect(),
            reasoning_rules,
        }
    }

    /// Append a content rule, evaluated after the existing ones.
    #[must_use]
    pub fn with_content_rule(mut self, rule: FieldRule) -> Self {
        self.content_rules.push(rule);
        self
    }

    /// Append a reasoning rule, evaluated after the existing ones.
    #[must_use]
    pub fn with_reasoning_rule(mut self, rule: FieldRule) -> Self {
        self.reasoning_rules.push(rule);
        self
    }

    #[must_use]
    pub fn content_rules(&self) -> &[FieldRule] {
        &self.content_rules
    }

    #[must_use]
    pub fn reasoning_rules(&self) -> &[FieldRule] {
        &self.reasoning_rules
    }

    /// Extract a delta from an already-parsed payload.
    #[must_use]
    pub fn extract(&self, payload: &Value) -> DeltaEvent {
        DeltaEvent {
            content: first_match(&self.content_rules, payload),
            reasoning: first_match(&self.reasoning_rules, payload),
            model: payload
                .get("model")
                .and_then(Value::as_str)
                .filter(|model| !model.is_empty())
                .map(str::to_owned),
        }
    }

    /// Parse one record payload and extract a delta.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the payload is not valid JSON.
    pub fn extract_str(&self, data: &str) -> Result<DeltaEvent, serde_json::Error> {
        let payload: Value = serde_json::from_str(data)?;
        Ok(self.extract(&payload))
    }
}

impl Default for DeltaExtractor {
    fn default() -> Self {
        Self::streaming()
    }
}

fn first_match(rules: &[FieldRule], payload: &Value) -> Option<String> {
    rules
        .iter()
        .find_map(|rule| rule.apply(payload))
        .map(TextRef::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn streaming_delta_content_and_model() {
        let delta = DeltaExtractor::streaming().extract(&json!({
            "model": "openai/gpt-4o",
            "choices": [{"delta": {"content": "Hel"}}]
        }));
        assert_eq!(delta.content.as_deref(), Some("Hel"));
        assert_eq!(delta.model.as_deref(), Some("openai/gpt-4o"));
        assert!(delta.reasoning.is_none());
    }

    #[test]
    fn empty_delta_content_falls_back_to_top_level_text() {
        let delta = DeltaExtractor::streaming().extract(&json!({
            "text": "legacy",
            "choices": [{"delta": {"content": ""}}]
        }));
        assert_eq!(delta.content.as_deref(), Some("legacy"));
    }

    #[test]
    fn reasoning_found_under_each_vendor_name() {
        let extractor = DeltaExtractor::streaming();
        for field in REASONING_FIELDS {
            let payload: Value =
                serde_json::from_str(&format!(r#"{{"choices":[{{"delta":{{"{field}":"step"}}}}]}}"#))
                    .expect("payload");
            let delta = extractor.extract(&payload);
            assert_eq!(delta.reasoning.as_deref(), Some("step"), "field {field}");
        }
    }

    #[test]
    fn reasoning_checked_at_choice_and_payload_levels() {
        let extractor = DeltaExtractor::streaming();
        let at_choice = extractor.extract(&json!({"choices": [{"thinking": "hmm", "delta": {}}]}));
        assert_eq!(at_choice.reasoning.as_deref(), Some("hmm"));

        let at_payload = extractor.extract(&json!({"reasoning_content": "top", "choices": []}));
        assert_eq!(at_payload.reasoning.as_deref(), Some("top"));
    }

    #[test]
    fn delta_level_wins_over_outer_levels() {
        let delta = DeltaExtractor::streaming().extract(&json!({
            "reasoning": "outer",
            "choices": [{"delta": {"thinking_content": "inner"}}]
        }));
        assert_eq!(delta.reasoning.as_deref(), Some("inner"));
    }

    #[test]
    fn empty_reasoning_string_is_skipped() {
        let delta = DeltaExtractor::streaming().extract(&json!({
            "choices": [{"delta": {"reasoning": "", "reasoning_content": "real"}}]
        }));
        assert_eq!(delta.reasoning.as_deref(), Some("real"));
    }

    #[test]
    fn nested_reasoning_object_is_accepted() {
        let delta = DeltaExtractor::streaming().extract(&json!({
            "choices": [{"delta": {"reasoning": {"text": "nested"}}}]
        }));
        assert_eq!(delta.reasoning.as_deref(), Some("nested"));
    }

    #[test]
    fn document_content_parts_are_joined() {
        let delta = DeltaExtractor::document().extract(&json!({
            "choices": [{"message": {"content": [
                {"type": "text", "text": "Hello "},
                {"type": "image_url", "image_url": {"url": "x"}},
                {"type": "text", "text": "there"}
            ]}}]
        }));
        assert_eq!(delta.content.as_deref(), Some("Hello there"));
    }

    #[test]
    fn appended_rule_supports_new_provider() {
        let extractor =
            DeltaExtractor::streaming().with_reasoning_rule(FieldRule::new(Scope::Delta, "thought"));
        assert_eq!(extractor.reasoning_rules().len(), 13);
        let delta = extractor.extract(&json!({"choices": [{"delta": {"thought": "new"}}]}));
        assert_eq!(delta.reasoning.as_deref(), Some("new"));
    }

    #[test]
    fn extract_str_rejects_malformed_json() {
        assert!(DeltaExtractor::streaming()
            .extract_str("{\"choices\": [")
            .is_err());
    }

    #[test]
    fn model_only_delta_is_not_empty() {
        let delta = DeltaExtractor::streaming().extract(&json!({"model": "m", "choices": []}));
        assert!(!delta.is_empty());
        assert!(DeltaEvent::default().is_empty());
    }
}
