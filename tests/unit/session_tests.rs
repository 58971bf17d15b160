//! Demultiplexer session state machine tests.

use agent_demux::config::DemuxConfig;
use agent_demux::demux::{DemuxSession, SessionState, StreamEvent};
use agent_demux::AppError;

use super::fixtures::{
    deltas, run_chunks, session, token_frame, token_from, tool_frame, tool_payloads, Closed,
    Recorder,
};

// ── Worked example ───────────────────────────────────────────

#[test]
fn tool_notice_split_mid_name_then_token() {
    let chunks = [
        r#"Tool :{"tool_name":"sear"#,
        r#"ch","additional_kwargs":{}}Toly :{"event":"on_chat_model_stream","metadata":{"langgraph_node":"Toly"},"data":{"chunk":{"content":"Hi"}}}"#,
    ];

    let events = run_chunks(&chunks);

    assert_eq!(events.len(), 3);
    let payloads = tool_payloads(&events);
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["tool_name"], "search");
    assert_eq!(events[1], StreamEvent::ContentDelta { text: "Hi".into() });
    assert_eq!(events[2], StreamEvent::ContentComplete { text: "Hi".into() });
}

// ── State machine ────────────────────────────────────────────

#[test]
fn session_lifecycle_open_to_completed() {
    let mut session = session();
    let mut events = Vec::new();
    assert_eq!(session.state(), SessionState::Open);

    session.feed(token_frame("a").as_bytes(), &mut events).expect("feed");
    assert_eq!(session.state(), SessionState::Open);

    session.end_of_stream(&mut events).expect("end");
    assert_eq!(session.state(), SessionState::Completed);
    assert!(session.state().is_closed());
    assert_eq!(session.buffered(), 0);
}

#[test]
fn empty_stream_completes_with_empty_transcript() {
    let events = run_chunks::<&[u8]>(&[]);
    assert_eq!(events, vec![StreamEvent::ContentComplete { text: String::new() }]);
}

#[test]
fn feed_after_completion_is_rejected() {
    let mut session = session();
    let mut events = Vec::new();
    session.end_of_stream(&mut events).expect("end");

    let err = session.feed(b"Toly :{}", &mut events).expect_err("closed");
    assert!(matches!(err, AppError::Stream(_)));
    assert!(session.end_of_stream(&mut events).is_err());
}

#[test]
fn sessions_have_distinct_ids() {
    assert_ne!(session().id(), session().id());
}

// ── Output contract ──────────────────────────────────────────

#[test]
fn repeated_tool_notice_yields_one_event() {
    let notice = tool_frame("search", r#"{"q":"sol","limit":3}"#);
    let reordered = tool_frame("search", r#"{"limit":3,"q":"sol"}"#);
    let input = format!("{notice}{}{reordered}{notice}", token_frame("x"));

    let mut session = session();
    let mut events = Vec::new();
    session.feed(input.as_bytes(), &mut events).expect("feed");
    session.end_of_stream(&mut events).expect("end");

    assert_eq!(tool_payloads(&events).len(), 1);
    let stats = session.stats();
    assert_eq!(stats.tool_events, 1);
    assert_eq!(stats.duplicates, 2);
}

#[test]
fn complete_text_equals_concatenated_deltas() {
    let input = [
        token_frame("The "),
        token_from("planner", "ignored"),
        token_frame("answer "),
        tool_frame("lookup", "{}"),
        token_frame("is 42"),
    ]
    .concat();

    let events = run_chunks(&[input]);

    let deltas = deltas(&events);
    assert_eq!(deltas, ["The ", "answer ", "is 42"]);
    assert_eq!(
        events.last(),
        Some(&StreamEvent::ContentComplete {
            text: deltas.concat()
        })
    );
}

#[test]
fn tool_events_precede_model_events_in_one_window() {
    let input = format!(
        "{}{}{}",
        token_frame("before"),
        tool_frame("search", "{}"),
        token_frame("after")
    );

    let mut session = session();
    let mut events = Vec::new();
    session.feed(input.as_bytes(), &mut events).expect("feed");

    assert!(matches!(events[0], StreamEvent::Tool { .. }));
    assert_eq!(events[1], StreamEvent::ContentDelta { text: "before".into() });
    assert_eq!(events.len(), 2, "the trailing frame is still open");

    session.end_of_stream(&mut events).expect("end");
    assert_eq!(deltas(&events), ["before", "after"]);
}

#[test]
fn open_trailing_frame_is_held_until_more_input() {
    let mut session = session();
    let mut events = Vec::new();

    session.feed(token_frame("a").as_bytes(), &mut events).expect("feed");
    assert!(events.is_empty());
    assert!(session.buffered() > 0);

    session.feed(token_frame("b").as_bytes(), &mut events).expect("feed");
    assert_eq!(deltas(&events), ["a"]);
}

#[test]
fn preamble_before_first_tag_is_discarded() {
    let mut session = session();
    let mut events = Vec::new();

    session.feed(&[b'.'; 100], &mut events).expect("feed");
    assert!(session.buffered() < 6);

    session.feed(token_frame("x").as_bytes(), &mut events).expect("feed");
    session.end_of_stream(&mut events).expect("end");
    assert_eq!(deltas(&events), ["x"]);
}

// ── Lenient handling ─────────────────────────────────────────

#[test]
fn truncated_trailing_frame_does_not_block_completion() {
    let input = format!("{}{}", token_frame("ok"), r#"Tool :{"tool_name":"sea"#);

    let mut session = session();
    let mut events = Vec::new();
    session.feed(input.as_bytes(), &mut events).expect("feed");
    session.end_of_stream(&mut events).expect("end");

    assert_eq!(session.state(), SessionState::Completed);
    assert!(tool_payloads(&events).is_empty());
    assert_eq!(session.transcript(), "ok");
    assert_eq!(session.stats().dropped, 1);
}

#[test]
fn malformed_frame_between_tags_is_dropped_mid_stream() {
    let input = format!("Tool :<not json>{}{}", token_frame("a"), token_frame("b"));

    let mut session = session();
    let mut events = Vec::new();
    session.feed(input.as_bytes(), &mut events).expect("feed");

    assert_eq!(deltas(&events), ["a"]);
    assert_eq!(session.stats().dropped, 1);
}

#[test]
fn tag_literal_inside_tool_arguments_is_not_a_frame() {
    let input = format!(
        "{}{}",
        tool_frame("echo", r#"{"text":"say Toly : hi"}"#),
        token_frame("done")
    );

    let events = run_chunks(&[input]);

    let payloads = tool_payloads(&events);
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["additional_kwargs"]["text"], "say Toly : hi");
    assert_eq!(deltas(&events), ["done"]);
}

// ── Failure paths ────────────────────────────────────────────

#[test]
fn unconsumed_input_over_limit_fails_session() {
    let config = DemuxConfig {
        max_buffer_bytes: 32,
        ..DemuxConfig::default()
    };
    let mut session = DemuxSession::new(&config).expect("session");
    let mut sink = Recorder::default();

    let err = session
        .feed(token_frame(&"x".repeat(64)).as_bytes(), &mut sink)
        .expect_err("over limit");

    assert!(matches!(err, AppError::Stream(_)));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(sink.failures.len(), 1);
    assert_eq!(session.buffered(), 0);
}

#[test]
fn abort_signals_sink_and_discards_state() {
    let mut session = session();
    let mut sink = Recorder::default();
    session.feed(token_frame("a").as_bytes(), &mut sink).expect("feed");
    session.feed(token_frame("b").as_bytes(), &mut sink).expect("feed");
    assert_eq!(session.transcript(), "a");

    let err = session.abort(AppError::Upstream("connection reset".into()), &mut sink);

    assert_eq!(err.to_string(), "upstream: connection reset");
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(sink.failures, ["upstream: connection reset"]);
    assert_eq!(session.transcript(), "");
    assert_eq!(session.buffered(), 0);
    assert!(
        !sink
            .events
            .iter()
            .any(|event| matches!(event, StreamEvent::ContentComplete { .. })),
        "a failed session never completes"
    );
}

#[test]
fn abort_after_close_signals_nothing() {
    let mut session = session();
    let mut sink = Recorder::default();
    session.end_of_stream(&mut sink).expect("end");

    session.abort(AppError::Upstream("late".into()), &mut sink);

    assert!(sink.failures.is_empty());
    assert_eq!(session.state(), SessionState::Completed);
}

#[test]
fn cancel_releases_state_without_signal() {
    let mut session = session();
    let mut sink = Recorder::default();
    session.feed(token_frame("a").as_bytes(), &mut sink).expect("feed");

    session.cancel();

    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.buffered(), 0);
    assert!(sink.failures.is_empty());
    assert!(session.feed(b"more", &mut sink).is_err());
}

#[test]
fn sink_failure_fails_session() {
    let mut session = session();
    let input = format!("{}{}", tool_frame("search", "{}"), token_frame("a"));

    let err = session.feed(input.as_bytes(), &mut Closed).expect_err("sink closed");

    assert!(matches!(err, AppError::Sink(_)));
    assert_eq!(session.state(), SessionState::Failed);
}
