pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod reply;
pub mod state;
pub mod stream;
pub mod transport;

pub use error::{ErrorCategory, ReplyError};
pub use protocol::{DeltaEvent, PromptSegment, ReplyRequest};
pub use reply::{MessageRecord, ReplyResult, ResponseCoordinator, TranscriptReconciler};
pub use stream::ReplyObserver;
