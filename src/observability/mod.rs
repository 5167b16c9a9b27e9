pub mod token_counter;

use tracing_subscriber::EnvFilter;

use crate::protocol::request::ReplyRequest;
use crate::reply::ReplyResult;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
///
/// `RUST_LOG`, when set, overrides the configured level. Logs go to stderr
/// so stdout stays free for reply text.
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(tracing_level(&level)).unwrap_or_else(|_| EnvFilter::new("INFO"))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

fn tracing_level(level: &str) -> &str {
    match level {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    }
}

/// Log the settle summary of a reply, computing duration from start time.
pub fn log_reply_complete(
    request: &ReplyRequest,
    result: &ReplyResult,
    start_time: std::time::Instant,
) {
    token_counter::log_reply_usage(request, result, start_time.elapsed());
}
