//! Model-token filtering and transcript tests.

use agent_demux::demux::{ModelProcessor, Outcome, StreamEvent};

fn processor() -> ModelProcessor {
    ModelProcessor::new("Toly", "on_chat_model_stream")
}

fn token(node: &str, event: &str, content: &str) -> String {
    format!(
        r#"{{"event":"{event}","metadata":{{"langgraph_node":"{node}"}},"data":{{"chunk":{{"content":{content}}}}}}}"#
    )
}

#[test]
fn generation_token_is_emitted_and_recorded() {
    let mut model = processor();
    let mut events = Vec::new();

    let body = token("Toly", "on_chat_model_stream", r#""Hel""#);
    let outcome = model.process(body.as_bytes(), false, &mut events).expect("process");

    assert_eq!(outcome, Outcome::Emitted);
    assert_eq!(events, vec![StreamEvent::ContentDelta { text: "Hel".into() }]);
    assert_eq!(model.transcript(), "Hel");
    assert_eq!(model.deltas(), 1);
}

#[test]
fn tokens_from_other_nodes_are_consumed_without_output() {
    let mut model = processor();
    let mut events: Vec<StreamEvent> = Vec::new();

    let body = token("planner", "on_chat_model_stream", r#""thinking""#);
    let outcome = model.process(body.as_bytes(), false, &mut events).expect("process");

    assert_eq!(outcome, Outcome::Emitted);
    assert!(events.is_empty());
    assert_eq!(model.transcript(), "");
}

#[test]
fn other_event_kinds_are_consumed_without_output() {
    let mut model = processor();
    let mut events: Vec<StreamEvent> = Vec::new();

    let body = token("Toly", "on_chain_start", r#""x""#);
    assert_eq!(
        model.process(body.as_bytes(), false, &mut events).expect("process"),
        Outcome::Emitted
    );
    assert_eq!(
        model.process(br#"{"event":"on_chain_end"}"#, false, &mut events).expect("process"),
        Outcome::Emitted
    );
    assert!(events.is_empty());
}

#[test]
fn empty_content_emits_nothing() {
    let mut model = processor();
    let mut events: Vec<StreamEvent> = Vec::new();

    let body = token("Toly", "on_chat_model_stream", r#""""#);
    model.process(body.as_bytes(), false, &mut events).expect("process");

    assert!(events.is_empty());
    assert_eq!(model.deltas(), 0);
}

#[test]
fn content_block_arrays_are_flattened() {
    let mut model = processor();
    let mut events = Vec::new();

    let body = token(
        "Toly",
        "on_chat_model_stream",
        r#"[{"type":"text","text":"a"},{"type":"text","text":"b"}]"#,
    );
    model.process(body.as_bytes(), false, &mut events).expect("process");

    assert_eq!(events, vec![StreamEvent::ContentDelta { text: "ab".into() }]);
}

#[test]
fn body_is_not_trimmed_but_whitespace_is_valid_json() {
    let mut model = processor();
    let mut events = Vec::new();

    let body = format!("\n{}\n", token("Toly", "on_chat_model_stream", r#""x""#));
    model.process(body.as_bytes(), false, &mut events).expect("process");

    assert_eq!(model.transcript(), "x");
}

#[test]
fn truncated_event_defers_then_drops() {
    let mut model = processor();
    let mut events: Vec<StreamEvent> = Vec::new();
    let body = br#"{"event":"on_chat_model_stream","data":{"chu"#;

    assert_eq!(
        model.process(body, false, &mut events).expect("mid-stream"),
        Outcome::DeferUntilMore
    );
    assert_eq!(
        model.process(body, true, &mut events).expect("final"),
        Outcome::Dropped
    );
}

#[test]
fn malformed_event_is_dropped_mid_stream() {
    let mut model = processor();
    let mut events: Vec<StreamEvent> = Vec::new();

    assert_eq!(
        model.process(b"<html>", false, &mut events).expect("process"),
        Outcome::Dropped
    );
}

#[test]
fn transcript_concatenates_deltas_in_order() {
    let mut model = processor();
    let mut events = Vec::new();

    for piece in ["The ", "answer ", "is 42"] {
        let body = token("Toly", "on_chat_model_stream", &format!("\"{piece}\""));
        model.process(body.as_bytes(), false, &mut events).expect("process");
    }

    assert_eq!(model.transcript(), "The answer is 42");
    assert_eq!(model.take_transcript(), "The answer is 42");
    assert_eq!(model.transcript(), "");
}
