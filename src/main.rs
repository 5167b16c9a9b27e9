use std::io::Write;
use std::sync::Arc;

use replystream::config::{load_config, AppConfig};
use replystream::observability::init_tracing;
use replystream::protocol::{DeltaEvent, PromptSegment, ReplyRequest};
use replystream::reply::{ReplyMode, ReplySettings, ResponseCoordinator, TranscriptReconciler};
use replystream::state::{
    InMemoryTranscript, ReasoningFlag, SharedReasoningFlag, TracingNoticeSink,
};
use replystream::stream::ReplyObserver;
use replystream::transport::HttpTransport;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const CONVERSATION_ID: &str = "cli";
const SYSTEM_PROMPT: &str = "You are a warm, concise companion.";

/// Writes content to stdout and reasoning to stderr as fragments arrive.
#[derive(Default)]
struct TerminalObserver {
    printed_content: bool,
}

impl ReplyObserver for TerminalObserver {
    fn on_delta(&mut self, delta: &DeltaEvent) {
        if let Some(reasoning) = delta.reasoning.as_deref() {
            let mut stderr = std::io::stderr().lock();
            let _ = stderr.write_all(reasoning.as_bytes());
            let _ = stderr.flush();
        }
        if let Some(content) = delta.content.as_deref() {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(content.as_bytes());
            let _ = stdout.flush();
            self.printed_content = true;
        }
    }

    fn on_superseded(&mut self) {
        if self.printed_content {
            eprintln!();
        }
        eprintln!("[stream interrupted, retrying without streaming]");
        self.printed_content = false;
    }
}

fn parse_args() -> (String, String) {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = match args.first() {
        Some(first)
            if std::path::Path::new(first)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml")) =>
        {
            args.remove(0)
        }
        _ => DEFAULT_CONFIG_PATH.to_string(),
    };
    let prompt = args.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: replystream [config.yaml] <prompt...>");
        std::process::exit(2);
    }
    (config_path, prompt)
}

fn main() {
    let (config_path, prompt) = parse_args();
    let config = load_config(&config_path).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.features.log_level);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    if let Err(message) = runtime.block_on(run(config, prompt)) {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig, prompt: String) -> Result<(), String> {
    let transport = HttpTransport::new(&config.endpoint)
        .map_err(|err| format!("Failed to build transport: {err}"))?;
    let reasoning_flag = SharedReasoningFlag::new(config.features.extended_reasoning);
    let mut coordinator =
        ResponseCoordinator::new(transport, reasoning_flag.clone(), TracingNoticeSink)
            .with_settings(ReplySettings::from_config(&config.reply));
    let reconciler = TranscriptReconciler::new(Arc::new(InMemoryTranscript::new()));

    let request = ReplyRequest::new(
        CONVERSATION_ID,
        config.reply.model.clone(),
        vec![PromptSegment::system(SYSTEM_PROMPT), PromptSegment::user(prompt)],
    )
    .with_stream(config.reply.stream)
    .with_extended_reasoning(coordinator.reasoning_enabled());

    tracing::info!(
        "replystream sending to {} (model={}, stream={}, reasoning={})",
        config.endpoint.base_url,
        request.model(),
        request.stream(),
        request.extended_reasoning()
    );

    let mut observer = TerminalObserver::default();
    let result = coordinator
        .issue_reply(request, &mut observer)
        .await
        .map_err(|err| format!("Reply failed ({:?}): {err}", err.category()))?;

    if result.mode == ReplyMode::Document || !observer.printed_content {
        if !result.reasoning.is_empty() && result.mode == ReplyMode::Document {
            eprintln!("{}", result.reasoning);
        }
        print!("{}", result.content);
    }
    println!();

    let placeholder = coordinator
        .take_placeholder()
        .ok_or_else(|| "Reply settled without a placeholder".to_string())?;
    let splice = reconciler
        .reconcile(placeholder, &result)
        .map_err(|err| format!("Failed to store reply: {err}"))?;

    eprintln!(
        "[model={} mode={:?} attempts={} reasoning_enabled={} stored_at={}]",
        splice.record.model,
        result.mode,
        result.attempts,
        reasoning_flag.is_enabled(),
        splice.record.created_at.to_rfc3339()
    );
    Ok(())
}
