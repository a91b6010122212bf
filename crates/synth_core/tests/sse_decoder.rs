use pretty_assertions::assert_eq;
use serde_json::json;
use synth_core::{Payload, SseDecoder, StreamEvent, DEFAULT_EVENT_NAME};

const TRANSCRIPT: &str = concat!(
    ": keep-alive\n",
    "event: stage\n",
    "data: {\"stage\":\"retrieval\",\"message\":\"Searching…\"}\n",
    "\n",
    "event: token\n",
    "data: {\"token\":\"Hél\"}\n",
    "\n",
    "data: {\"token\":\"lo\"}\n",
    "\n",
    "event: citation\n",
    "data: {\"index\":1,\"title\":\"Pathways of the β-cell\"}\n",
    "\n",
    "event: heartbeat\n",
    "data: ping\n",
    "\r\n",
    "event: done\r\n",
    "data: {\"citations\":[]}\r\n",
    "\r\n",
);

fn decode_whole(input: &[u8]) -> Vec<StreamEvent> {
    let mut decoder = SseDecoder::new();
    let mut events = decoder.feed(input);
    events.extend(decoder.finish());
    events
}

fn decode_in_chunks(input: &[u8], chunk_size: usize) -> Vec<StreamEvent> {
    let mut decoder = SseDecoder::new();
    let mut events = Vec::new();
    for chunk in input.chunks(chunk_size) {
        events.extend(decoder.feed(chunk));
    }
    events.extend(decoder.finish());
    events
}

#[test]
fn token_then_done() {
    let events = decode_whole(
        b"event: token\ndata: {\"token\":\"Hello\"}\n\nevent: done\ndata: {\"citations\":[]}\n\n",
    );
    assert_eq!(
        events,
        vec![
            StreamEvent::Token("Hello".into()),
            StreamEvent::Done(json!({"citations": []})),
        ]
    );
}

#[test]
fn full_transcript_decodes_in_order() {
    let events = decode_whole(TRANSCRIPT.as_bytes());
    assert_eq!(
        events,
        vec![
            StreamEvent::Stage(json!({"stage": "retrieval", "message": "Searching…"})),
            StreamEvent::Token("Hél".into()),
            // The event name persists across the blank line.
            StreamEvent::Token("lo".into()),
            StreamEvent::Citation(json!({"index": 1, "title": "Pathways of the β-cell"})),
            StreamEvent::Data {
                event: "heartbeat".into(),
                payload: Payload::Raw("ping".into()),
            },
            StreamEvent::Done(json!({"citations": []})),
        ]
    );
}

#[test]
fn fragmentation_does_not_change_output() {
    let bytes = TRANSCRIPT.as_bytes();
    let expected = decode_whole(bytes);
    for chunk_size in 1..=bytes.len() {
        assert_eq!(
            decode_in_chunks(bytes, chunk_size),
            expected,
            "chunk size {chunk_size}"
        );
    }
}

#[test]
fn split_multibyte_character_survives() {
    let line = "event: token\ndata: {\"token\":\"β\"}\n".as_bytes();
    let beta = line.iter().position(|b| *b == 0xCE).expect("beta lead byte");

    let mut decoder = SseDecoder::new();
    assert!(decoder.feed(&line[..=beta]).is_empty());
    assert_eq!(
        decoder.feed(&line[beta + 1..]),
        vec![StreamEvent::Token("β".into())]
    );
}

#[test]
fn partial_line_waits_for_newline() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.feed(b"event: progress\ndata: {\"percent\"").is_empty());
    assert_eq!(decoder.current_event(), "progress");
    assert!(decoder.pending_len() > 0);

    let events = decoder.feed(b":50}\n");
    assert_eq!(events, vec![StreamEvent::Progress(json!({"percent": 50}))]);
    assert_eq!(decoder.pending_len(), 0);
}

#[test]
fn malformed_data_is_delivered_raw() {
    let events = decode_whole(b"event: section\ndata: {not json\ndata: plain text\n");
    assert_eq!(
        events,
        vec![
            StreamEvent::Data {
                event: "section".into(),
                payload: Payload::Raw("{not json".into()),
            },
            StreamEvent::Data {
                event: "section".into(),
                payload: Payload::Raw("plain text".into()),
            },
        ]
    );
}

#[test]
fn default_event_name_is_message() {
    let events = decode_whole(b"data: {\"hello\":true}\n");
    assert_eq!(
        events,
        vec![StreamEvent::Data {
            event: DEFAULT_EVENT_NAME.into(),
            payload: Payload::Json(json!({"hello": true})),
        }]
    );
}

#[test]
fn error_event_carries_message() {
    let events = decode_whole(b"event: error\ndata: {\"message\":\"model overloaded\"}\n\n");
    assert_eq!(
        events,
        vec![StreamEvent::Error {
            message: "model overloaded".into()
        }]
    );
}

#[test]
fn empty_data_and_unknown_fields_are_skipped() {
    let events = decode_whole(b"id: 7\nretry: 1000\ndata:\ndata:   \n\n");
    assert!(events.is_empty());
}

#[test]
fn custom_events_and_known_payloads_keep_json() {
    let events = decode_whole(
        b"event: image\ndata: {\"url\":\"/img/1.png\"}\nevent: section\ndata: {\"title\":\"Intro\"}\nevent: graph_update\ndata: {\"nodes\":2}\n",
    );
    assert_eq!(
        events,
        vec![
            StreamEvent::Image(json!({"url": "/img/1.png"})),
            StreamEvent::Section(json!({"title": "Intro"})),
            StreamEvent::Data {
                event: "graph_update".into(),
                payload: Payload::Json(json!({"nodes": 2})),
            },
        ]
    );
}

#[test]
fn finish_flushes_unterminated_line() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.feed(b"event: done\ndata: {\"ok\":1}").is_empty());
    assert_eq!(decoder.finish(), vec![StreamEvent::Done(json!({"ok": 1}))]);
    assert!(decoder.finish().is_empty());
}
