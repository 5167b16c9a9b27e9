use bytes::Bytes;
use replystream::error::ReplyError;
use replystream::protocol::DeltaEvent;
use replystream::stream::sse::decode_all;
use replystream::stream::{EventRecord, FrameDecoder, StreamAccumulator};
use serde_json::json;

fn sample_stream() -> String {
    let mut out = String::new();
    out.push_str(": keep-alive\n\n");
    for (index, piece) in ["Guten ", "Tag, ", "naïve ", "café ", "日本語 ", "👋🏽"]
        .iter()
        .enumerate()
    {
        let record = json!({
            "model": "openai/gpt-4o",
            "choices": [{"delta": {"content": piece, "reasoning": format!("step {index}")}}]
        });
        if index % 2 == 0 {
            out.push_str(&format!("data: {record}\n\n"));
        } else {
            out.push_str(&format!("data: {record}\r\n\r\n"));
        }
    }
    out.push_str("event: ping\ndata: {\"choices\": [\n\n");
    out.push_str("data: [DONE]\n\n");
    out
}

fn feed_in_pieces(bytes: &[u8], cuts: &[usize]) -> Vec<EventRecord> {
    let mut decoder = FrameDecoder::new();
    let mut out = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        decoder
            .feed_bytes(&bytes[start..cut], &mut out)
            .expect("valid utf-8");
        start = cut;
    }
    decoder.feed_bytes(&bytes[start..], &mut out).expect("valid utf-8");
    decoder.finish();
    out
}

fn random_cuts(rng: &mut fastrand::Rng, len: usize) -> Vec<usize> {
    let mut cuts: Vec<usize> = (0..rng.usize(1..24)).map(|_| rng.usize(0..=len)).collect();
    cuts.sort_unstable();
    cuts
}

#[test]
fn test_byte_at_a_time_matches_whole_buffer() {
    let input = sample_stream();
    let bytes = input.as_bytes();
    let whole = decode_all(bytes).expect("decode");
    let every_byte: Vec<usize> = (1..bytes.len()).collect();
    assert_eq!(feed_in_pieces(bytes, &every_byte), whole);
    assert_eq!(whole.len(), 8);
    assert!(whole.last().expect("records").is_done());
}

#[test]
fn test_random_splits_match_whole_buffer() {
    let input = sample_stream();
    let bytes = input.as_bytes();
    let whole = decode_all(bytes).expect("decode");
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    for _ in 0..200 {
        let cuts = random_cuts(&mut rng, bytes.len());
        assert_eq!(feed_in_pieces(bytes, &cuts), whole, "cuts {cuts:?}");
    }
}

#[tokio::test]
async fn test_observed_fragments_concatenate_to_totals() {
    let input = sample_stream();
    let mut rng = fastrand::Rng::with_seed(42);
    for _ in 0..20 {
        let cuts = random_cuts(&mut rng, input.len());
        let mut chunks: Vec<Result<Bytes, ReplyError>> = Vec::new();
        let mut start = 0;
        for cut in cuts.into_iter().chain(std::iter::once(input.len())) {
            chunks.push(Ok(Bytes::copy_from_slice(&input.as_bytes()[start..cut])));
            start = cut;
        }

        let mut content = String::new();
        let mut reasoning = String::new();
        let mut observer = |delta: &DeltaEvent| {
            content.push_str(delta.content.as_deref().unwrap_or_default());
            reasoning.push_str(delta.reasoning.as_deref().unwrap_or_default());
        };
        let totals = StreamAccumulator::new()
            .run_bytes(futures_util::stream::iter(chunks), &mut observer)
            .await
            .expect("stream");

        assert_eq!(content, totals.content);
        assert_eq!(reasoning, totals.reasoning);
        assert_eq!(totals.content, "Guten Tag, naïve café 日本語 👋🏽");
        assert_eq!(totals.skipped, 1);
        assert!(totals.saw_sentinel);
    }
}

#[test]
fn test_unterminated_tail_is_never_emitted() {
    let input = "data: {\"choices\":[{\"delta\":{\"content\":\"kept\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"lost\"}}]}\n";
    let records = decode_all(input.as_bytes()).expect("decode");
    assert_eq!(records.len(), 1);
    assert!(records[0].data.contains("kept"));
}
