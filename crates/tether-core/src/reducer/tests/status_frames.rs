use serde_json::json;

use super::*;
use pretty_assertions::assert_eq;

fn approval_request(id: i64) -> RuntimeAction {
    frame(json!({
        "id": id,
        "conversation_id": PLANS.0,
        "role": "approval_request",
        "content": { "text": "Run the deploy tool?" },
    }))
}

fn status(content: serde_json::Value) -> RuntimeAction {
    frame(json!({ "role": "status", "conversation_id": PLANS.0, "content": content }))
}

#[test]
fn approval_processed_removes_message_once() {
    let mut state = state();
    run_runtime(&mut state, approval_request(77));
    run_runtime(&mut state, frame(turn(PLANS, "complete", "ok")));
    assert_eq!(state.store.message_count(), 2);

    run_runtime(&mut state, status(json!({ "approval_response_processed": 77 })));
    let after_first = transcript(&state, PLANS);
    run_runtime(&mut state, status(json!({ "approval_response_processed": 77 })));

    assert!(state.store.message(MessageId::Server(77)).is_none());
    assert_eq!(transcript(&state, PLANS), after_first);
    assert_eq!(state.store.message_count(), 1);
}

#[test]
fn approval_without_conversation_finds_message_owner() {
    let mut state = state();
    run_runtime(&mut state, approval_request(78));

    run_runtime(
        &mut state,
        frame(json!({ "role": "status", "content": { "approval_response_processed": 78 } })),
    );

    assert!(state.store.conversation(PLANS).unwrap().message_ids.is_empty());
}

#[test]
fn tool_start_stays_until_replaced_by_outcome() {
    let mut state = state();

    run_runtime_at(&mut state, status(json!({ "tool_start": "Searching" })), 0);
    run_runtime_at(&mut state, RuntimeAction::Tick, 600_000);
    let current = state.notifications.current().unwrap();
    assert_eq!(current.message, "Searching");
    assert_eq!(current.kind, NotificationKind::ToolStart);

    run_runtime_at(
        &mut state,
        status(json!({ "tool_success": "Found 3 results" })),
        600_000,
    );
    assert_eq!(notification_text(&state), Some("Found 3 results"));

    run_runtime_at(&mut state, RuntimeAction::Tick, 601_999);
    assert_eq!(notification_text(&state), Some("Found 3 results"));
    run_runtime_at(&mut state, RuntimeAction::Tick, 602_000);
    assert_eq!(notification_text(&state), None);
}

#[test]
fn tool_error_uses_error_kind() {
    let mut state = state();

    run_runtime(&mut state, status(json!({ "tool_error": "Timed out" })));

    let current = state.notifications.current().unwrap();
    assert_eq!(current.kind, NotificationKind::ToolError);
    assert_eq!(current.expires_at_ms, Some(2_000));
}

#[test]
fn status_frames_never_add_messages() {
    let mut state = state();

    run_runtime(&mut state, status(json!({ "tool_start": "Working" })));
    run_runtime(&mut state, status(json!({ "progress": 50 })));

    assert_eq!(state.store.message_count(), 0);
    assert!(!state.store.conversation(CHAT).unwrap().unread_messages);
}

#[test]
fn alert_frames_show_default_lifetime_notifications() {
    let mut state = state();

    run_runtime_at(
        &mut state,
        frame(json!({ "role": "alert", "content": "Saved", "type": "success" })),
        100,
    );
    let current = state.notifications.current().unwrap();
    assert_eq!(current.kind, NotificationKind::Success);
    assert_eq!(current.expires_at_ms, Some(4_100));

    run_runtime(
        &mut state,
        frame(json!({ "role": "alert", "content": "Hmm", "type": "sparkly" })),
    );
    assert_eq!(state.notifications.current().unwrap().kind, NotificationKind::Info);
}

#[test]
fn xray_is_stashed_without_blocking_the_turn() {
    let mut state = state();
    let mut value = turn(PLANS, "complete", "answer");
    value["xray"] = json!({ "prompt": "system" });

    run_runtime(&mut state, frame(value));

    assert_eq!(state.diagnostics.xray, Some(json!({ "prompt": "system" })));
    assert_eq!(state.store.message_count(), 1);
}

#[test]
fn malformed_frames_change_nothing() {
    let mut state = state();
    let before = transcript(&state, PLANS);

    for text in ["", "not json", "{}", "[]", "42", "null", "{\"role\": 5}"] {
        let effects = run_runtime(&mut state, RuntimeAction::FrameReceived(text.to_string()));
        assert!(effects.is_empty());
    }

    assert_eq!(transcript(&state, PLANS), before);
    assert_eq!(state.store.message_count(), 0);
    assert!(state.notifications.current().is_none());
    assert!(state.diagnostics.xray.is_none());
}

#[test]
fn unknown_commands_are_ignored() {
    let mut state = state();

    let effects = run_runtime(
        &mut state,
        frame(json!({ "role": "command", "content": "dance" })),
    );

    assert!(effects.is_empty());
}
