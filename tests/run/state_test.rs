//! Tests for folding event streams into run state.

use agent_delegate::agents::CodexProtocol;
use agent_delegate::cli::{InvocationCall, InvocationKind, NormalizedEvent, StreamParser};
use agent_delegate::run::{RunLimits, RunState, RunStatus};
use serde_json::json;

fn start(id: &str) -> NormalizedEvent {
    NormalizedEvent::InvocationStarted(InvocationCall {
        id: id.to_string(),
        kind: InvocationKind::Tool,
        name: "read_file".to_string(),
        input: json!({ "path": id }),
    })
}

#[test]
fn invocation_cap_keeps_most_recent() {
    let mut state = RunState::new("codex", RunLimits::default());
    for i in 0..90 {
        state.apply(start(&format!("call-{i}")));
    }

    assert_eq!(state.invocations.len(), 80);
    for i in 0..10 {
        assert!(state.invocation(&format!("call-{i}")).is_none());
    }
    assert_eq!(state.invocations.front().unwrap().id, "call-10");
    assert_eq!(state.invocations.back().unwrap().id, "call-89");
}

#[test]
fn tails_never_exceed_caps() {
    let limits = RunLimits {
        max_invocations: 3,
        stderr_tail_lines: 4,
    };
    let mut state = RunState::new("codex", limits);
    for i in 0..50 {
        state.apply(start(&i.to_string()));
        state.push_stderr(format!("err {i}"));
        state.apply(NormalizedEvent::Raw {
            line: format!("raw {i}"),
        });
        assert!(state.invocations.len() <= 3);
        assert!(state.stderr_tail.len() <= 4);
        assert!(state.unparsed_tail.len() <= 4);
    }
    assert_eq!(state.stderr_tail, ["err 46", "err 47", "err 48", "err 49"]);
    assert_eq!(state.unparsed_tail.back().map(String::as_str), Some("raw 49"));
    let ids: Vec<&str> = state.invocations.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["47", "48", "49"]);
}

#[test]
fn parsed_stream_folds_into_state() {
    let mut parser = StreamParser::new(Box::new(CodexProtocol::new()));
    let mut state = RunState::new("codex", RunLimits::default());

    state.apply_all(parser.feed_str(concat!(
        "{\"type\":\"thread.started\",\"thread_id\":\"t-1\"}\n",
        "{\"type\":\"item.updated\",\"item\":{\"id\":\"m\",\"type\":\"agent_message\",\"text\":\"Work\"}}\n",
    )));
    assert_eq!(state.transcript, "Work");

    state.apply_all(parser.feed_str(
        "{\"type\":\"item.completed\",\"item\":{\"id\":\"m\",\"type\":\"agent_message\",\"text\":\"Working on it\"}}",
    ));
    assert_eq!(state.transcript, "Work");
    state.apply_all(parser.flush());

    assert_eq!(state.session_id.as_deref(), Some("t-1"));
    assert_eq!(state.transcript, "Working on it");
    assert!(state.finish_with_exit(Some(0), None));
    assert_eq!(state.status, RunStatus::Done);
}

#[test]
fn ended_at_is_set_once() {
    let mut state = RunState::new("codex", RunLimits::default());
    assert!(state.abort());
    let ended = state.ended_at;

    assert!(!state.abort());
    assert!(!state.fail("late"));
    assert!(!state.finish_with_exit(Some(1), None));

    assert_eq!(state.ended_at, ended);
    assert_eq!(state.status, RunStatus::Aborted);
    assert!(state.error.is_none());
    assert_eq!(state.exit_code, Some(1));
}

#[test]
fn snapshot_serializes_for_consumers() {
    let mut state = RunState::new("gemini", RunLimits::default());
    state.apply(start("t1"));
    state.finish_with_exit(Some(0), None);

    let value = serde_json::to_value(&state).unwrap();
    assert_eq!(value["status"], "done");
    assert_eq!(value["agent"], "gemini");
    assert_eq!(value["invocations"][0]["name"], "read_file");
    assert!(value.get("limits").is_none());
}
