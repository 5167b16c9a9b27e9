use serde_json::Value;

use crate::error::ReplyError;

use super::delta::{DeltaEvent, DeltaExtractor};

/// Decode a complete non-streaming chat-completions document.
///
/// Uses the document rule set of [`DeltaExtractor`], so a document and a
/// stream from the same provider resolve content and reasoning the same way.
///
/// # Errors
///
/// Returns [`ReplyError::Decode`] when the body is not a JSON object.
pub fn decode_document(body: &[u8]) -> Result<DeltaEvent, ReplyError> {
    decode_document_with(&DeltaExtractor::document(), body)
}

/// Decode a document with a caller-supplied rule set.
///
/// # Errors
///
/// Returns [`ReplyError::Decode`] when the body is not a JSON object.
pub fn decode_document_with(
    extractor: &DeltaExtractor,
    body: &[u8],
) -> Result<DeltaEvent, ReplyError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|err| ReplyError::Decode(format!("Invalid response document: {err}")))?;
    if !payload.is_object() {
        return Err(ReplyError::Decode(
            "Response document is not a JSON object".to_string(),
        ));
    }
    Ok(extractor.extract(&payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_message_content_reasoning_and_model() {
        let body = br#"{
            "id": "chatcmpl-1",
            "model": "deepseek/deepseek-r1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Sunny!", "reasoning": "Checked the forecast."},
                "finish_reason": "stop"
            }]
        }"#;
        let delta = decode_document(body).expect("decode");
        assert_eq!(delta.content.as_deref(), Some("Sunny!"));
        assert_eq!(delta.reasoning.as_deref(), Some("Checked the forecast."));
        assert_eq!(delta.model.as_deref(), Some("deepseek/deepseek-r1"));
    }

    #[test]
    fn decodes_legacy_choice_text() {
        let body = br#"{"model": "m", "choices": [{"text": "completion text"}]}"#;
        let delta = decode_document(body).expect("decode");
        assert_eq!(delta.content.as_deref(), Some("completion text"));
    }

    #[test]
    fn null_content_yields_no_content() {
        let body = br#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let delta = decode_document(body).expect("decode");
        assert!(delta.content.is_none());
    }

    #[test]
    fn non_json_body_is_decode_error() {
        let err = decode_document(b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, ReplyError::Decode(_)));
    }

    #[test]
    fn non_object_body_is_decode_error() {
        let err = decode_document(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, ReplyError::Decode(_)));
    }
}
