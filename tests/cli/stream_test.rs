//! Tests for line framing and protocol decoding through the stream parser.

use agent_delegate::agents::{ClaudeProtocol, CodexProtocol, GeminiProtocol};
use agent_delegate::cli::{NormalizedEvent, Protocol, StreamParser};

fn codex() -> Box<dyn Protocol> {
    Box::new(CodexProtocol::new())
}

fn claude() -> Box<dyn Protocol> {
    Box::new(ClaudeProtocol::new())
}

fn gemini() -> Box<dyn Protocol> {
    Box::new(GeminiProtocol::new())
}

const CODEX_STREAM: &str = concat!(
    "{\"type\":\"thread.started\",\"thread_id\":\"t-1\"}\n",
    "{\"type\":\"turn.started\"}\n",
    "{\"type\":\"item.started\",\"item\":{\"id\":\"item_0\",\"type\":\"command_execution\",\"command\":\"ls\",\"aggregated_output\":\"\",\"status\":\"in_progress\"}}\n",
    "warning: something on stdout\n",
    "\n",
    "{\"type\":\"item.completed\",\"item\":{\"id\":\"item_0\",\"type\":\"command_execution\",\"command\":\"ls\",\"aggregated_output\":\"a.rs\\n\",\"exit_code\":0,\"status\":\"completed\"}}\r\n",
    "{\"type\":\"item.completed\",\"item\":{\"id\":\"item_1\",\"type\":\"agent_message\",\"text\":\"Voilà ✓\"}}\n",
    "{\"type\":\"turn.completed\",\"usage\":{\"input_tokens\":10,\"cached_input_tokens\":2,\"output_tokens\":5}}",
);

const CLAUDE_STREAM: &str = concat!(
    "{\"type\":\"system\",\"subtype\":\"init\",\"session_id\":\"c-1\"}\n",
    "{\"type\":\"stream_event\",\"event\":{\"type\":\"message_start\",\"message\":{}}}\n",
    "{\"type\":\"stream_event\",\"event\":{\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Lé\"}}}\n",
    "{\"type\":\"stream_event\",\"event\":{\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"t me\"}}}\n",
    "{\"type\":\"assistant\",\"message\":{\"role\":\"assistant\",\"content\":[{\"type\":\"text\",\"text\":\"Lét me\"},{\"type\":\"tool_use\",\"id\":\"tu_1\",\"name\":\"Bash\",\"input\":{\"command\":\"ls\"}}]}}\n",
    "[1, 2, 3]\n",
    "{\"type\":\"user\",\"message\":{\"role\":\"user\",\"content\":[{\"type\":\"tool_result\",\"tool_use_id\":\"tu_1\",\"content\":\"a.rs\"}]}}\n",
    "{\"type\":\"result\",\"subtype\":\"success\",\"is_error\":false,\"result\":\"done\",\"total_cost_usd\":0.01}\n",
);

const GEMINI_STREAM: &str = concat!(
    "{\"type\":\"init\",\"session_id\":\"g-1\",\"model\":\"gemini-2.5-pro\"}\n",
    "{\"type\":\"message\",\"role\":\"user\",\"content\":\"task\"}\n",
    "{\"type\":\"message\",\"role\":\"assistant\",\"content\":\"Über \",\"delta\":true}\n",
    "{\"type\":\"message\",\"role\":\"assistant\",\"content\":\"alles\",\"delta\":true}\n",
    "{\"type\":\"tool_use\",\"tool_name\":\"read_file\",\"tool_id\":\"t1\",\"parameters\":{\"path\":\"a.rs\"}}\n",
    "{\"type\":\"tool_result\",\"tool_id\":\"t1\",\"status\":\"success\",\"output\":\"fn main() {}\"}\n",
    "{\"type\":\"mystery\",\"payload\":1}\n",
    "{\"type\":\"result\",\"status\":\"success\",\"stats\":{\"input_tokens\":3,\"output_tokens\":4}}\n",
);

type MakeProtocol = fn() -> Box<dyn Protocol>;

fn streams() -> Vec<(&'static str, MakeProtocol, &'static str)> {
    vec![
        ("codex", codex as MakeProtocol, CODEX_STREAM),
        ("claude", claude as MakeProtocol, CLAUDE_STREAM),
        ("gemini", gemini as MakeProtocol, GEMINI_STREAM),
    ]
}

fn decode_whole(protocol: Box<dyn Protocol>, input: &[u8]) -> Vec<NormalizedEvent> {
    let mut parser = StreamParser::new(protocol);
    let mut events = parser.feed(input);
    events.extend(parser.flush());
    events
}

fn decode_chunks(protocol: Box<dyn Protocol>, chunks: &[&[u8]]) -> Vec<NormalizedEvent> {
    let mut parser = StreamParser::new(protocol);
    let mut events = Vec::new();
    for chunk in chunks {
        events.extend(parser.feed(chunk));
    }
    events.extend(parser.flush());
    events
}

#[test]
fn framing_is_independent_of_single_split_point() {
    for (name, protocol, input) in streams() {
        let bytes = input.as_bytes();
        let expected = decode_whole(protocol(), bytes);
        assert!(!expected.is_empty(), "{name}: stream decoded to nothing");

        for split in 0..=bytes.len() {
            let (head, tail) = bytes.split_at(split);
            let events = decode_chunks(protocol(), &[head, tail]);
            assert_eq!(events, expected, "{name}: split at byte {split}");
        }
    }
}

#[test]
fn framing_survives_byte_at_a_time_delivery() {
    for (name, protocol, input) in streams() {
        let bytes = input.as_bytes();
        let expected = decode_whole(protocol(), bytes);
        let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_chunks(protocol(), &chunks), expected, "{name}");
    }
}

#[test]
fn framing_survives_uneven_chunk_sizes() {
    for (name, protocol, input) in streams() {
        let bytes = input.as_bytes();
        let expected = decode_whole(protocol(), bytes);
        for size in [2, 3, 7, 13, 64, 4096] {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            assert_eq!(
                decode_chunks(protocol(), &chunks),
                expected,
                "{name}: chunk size {size}"
            );
        }
    }
}

#[test]
fn codex_stream_decodes_expected_sequence() {
    let events = decode_whole(codex(), CODEX_STREAM.as_bytes());
    assert_eq!(events.len(), 6);
    assert_eq!(events[0].session_id(), Some("t-1"));
    assert_eq!(events[1].invocation_id(), Some("item_0"));
    assert_eq!(
        events[2],
        NormalizedEvent::Raw {
            line: "warning: something on stdout".to_string()
        }
    );
    assert_eq!(events[3].invocation_id(), Some("item_0"));
    assert_eq!(
        events[4],
        NormalizedEvent::MessageComplete {
            text: "Voilà ✓".to_string()
        }
    );
    assert!(matches!(events[5], NormalizedEvent::TurnCompleted { .. }));
}

#[test]
fn claude_stream_decodes_expected_sequence() {
    let events = decode_whole(claude(), CLAUDE_STREAM.as_bytes());
    assert_eq!(events[0].session_id(), Some("c-1"));
    assert_eq!(
        events[1],
        NormalizedEvent::MessageDelta {
            text: "Lé".to_string()
        }
    );
    assert_eq!(
        events[2],
        NormalizedEvent::MessageDelta {
            text: "Lét me".to_string()
        }
    );
    assert_eq!(
        events[3],
        NormalizedEvent::MessageComplete {
            text: "Lét me".to_string()
        }
    );
    assert_eq!(events[4].invocation_id(), Some("tu_1"));
    assert_eq!(
        events[5],
        NormalizedEvent::Raw {
            line: "[1, 2, 3]".to_string()
        }
    );
    assert_eq!(events[6].invocation_id(), Some("tu_1"));
    assert!(matches!(events[7], NormalizedEvent::TurnCompleted { .. }));
    assert_eq!(events.len(), 8);
}

#[test]
fn gemini_stream_decodes_expected_sequence() {
    let events = decode_whole(gemini(), GEMINI_STREAM.as_bytes());
    assert_eq!(events[0].session_id(), Some("g-1"));
    assert_eq!(
        events[2],
        NormalizedEvent::MessageDelta {
            text: "Über alles".to_string()
        }
    );
    assert_eq!(events[3].invocation_id(), Some("t1"));
    assert_eq!(events[4].invocation_id(), Some("t1"));
    match &events[5] {
        NormalizedEvent::Raw { line } => assert!(line.contains("mystery")),
        other => panic!("Expected Raw, got {other:?}"),
    }
    assert!(matches!(events[6], NormalizedEvent::TurnCompleted { .. }));
    assert_eq!(events.len(), 7);
}

#[test]
fn scenario_single_complete_message() {
    let mut parser = StreamParser::new(codex());
    let mut events = parser.feed_str("{\"type\":\"agent_message\",\"text\":\"Hello\"}\n");
    events.extend(parser.flush());
    assert_eq!(
        events,
        vec![NormalizedEvent::MessageComplete {
            text: "Hello".to_string()
        }]
    );
}

#[test]
fn scenario_line_split_across_chunks() {
    let mut parser = StreamParser::new(codex());
    assert!(parser.feed_str("{\"type\":\"ag").is_empty());
    let split = parser.feed_str("ent_message\",\"text\":\"Hi\"}\n");

    let whole = decode_whole(codex(), b"{\"type\":\"agent_message\",\"text\":\"Hi\"}\n");
    assert_eq!(split.len(), 1);
    assert_eq!(split, whole);
    assert!(parser.flush().is_empty());
}

#[test]
fn malformed_lines_become_raw_events_verbatim() {
    let lines = [
        "not json at all",
        "{\"type\": \"agent_message\", \"text\": ",
        "[1, 2]",
        "42",
        "\"just a string\"",
        "null",
    ];
    for (name, protocol, _) in streams() {
        for line in lines {
            let events = decode_whole(protocol(), format!("{line}\n").as_bytes());
            assert_eq!(
                events,
                vec![NormalizedEvent::Raw {
                    line: line.to_string()
                }],
                "{name}: {line}"
            );
        }
    }
}

#[test]
fn unknown_object_types_are_preserved_as_raw() {
    for (name, protocol, _) in streams() {
        let events = decode_whole(protocol(), b"{\"type\":\"brand_new_event\",\"n\":1}\n");
        match &events[..] {
            [NormalizedEvent::Raw { line }] => {
                assert!(line.contains("brand_new_event"), "{name}: {line}");
            }
            other => panic!("{name}: expected one Raw event, got {other:?}"),
        }
    }
}

#[test]
fn blank_lines_and_trailing_whitespace_produce_nothing() {
    for (name, protocol, _) in streams() {
        let events = decode_whole(protocol(), b"\n\r\n   \n\t");
        assert!(events.is_empty(), "{name}: {events:?}");
    }
}

#[test]
fn invalid_utf8_is_replaced_not_dropped() {
    let events = decode_whole(codex(), b"bad \xff bytes\n");
    assert_eq!(
        events,
        vec![NormalizedEvent::Raw {
            line: "bad \u{fffd} bytes".to_string()
        }]
    );
}
