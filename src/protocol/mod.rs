pub mod delta;
pub mod request;
pub mod response_decoder;

pub use delta::{DeltaEvent, DeltaExtractor, FieldRule, Scope};
pub use request::{PromptSegment, ReplyRequest, Role};
pub use response_decoder::decode_document;
