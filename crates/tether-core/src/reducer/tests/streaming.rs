use super::*;
use pretty_assertions::assert_eq;

#[test]
fn incomplete_frames_coalesce_into_one_message() {
    let mut state = state();

    run_runtime(&mut state, frame(turn(PLANS, "incomplete", "He")));
    assert!(state.store.conversation(PLANS).unwrap().is_loading);
    run_runtime(&mut state, frame(turn(PLANS, "incomplete", "Hello")));
    run_runtime(&mut state, frame(turn(PLANS, "complete", "Hello world")));

    assert_eq!(
        transcript(&state, PLANS),
        vec![(
            Role::Assistant,
            "Hello world".to_string(),
            Some(TurnStatus::Complete)
        )]
    );
    assert_eq!(state.store.message_count(), 1);
    assert!(!state.store.conversation(PLANS).unwrap().is_loading);
    assert!(!state.stall_timer.is_armed());
}

#[test]
fn new_turn_after_completion_appends() {
    let mut state = state();

    run_runtime(&mut state, frame(turn(PLANS, "complete", "first")));
    run_runtime(&mut state, frame(turn(PLANS, "incomplete", "sec")));
    run_runtime(&mut state, frame(turn(PLANS, "complete", "second")));

    assert_eq!(
        transcript(&state, PLANS),
        vec![
            (Role::Assistant, "first".to_string(), Some(TurnStatus::Complete)),
            (Role::Assistant, "second".to_string(), Some(TurnStatus::Complete)),
        ]
    );
}

#[test]
fn confirmed_server_id_takes_over_the_streaming_slot() {
    let mut state = state();

    run_runtime(&mut state, frame(turn(PLANS, "incomplete", "partial")));
    let temp_id = state.store.conversation(PLANS).unwrap().message_ids[0];
    assert!(temp_id.is_temp());

    let mut done = turn(PLANS, "complete", "done");
    done["id"] = serde_json::json!(50);
    run_runtime(&mut state, frame(done));

    let conversation = state.store.conversation(PLANS).unwrap();
    assert_eq!(conversation.message_ids, vec![MessageId::Server(50)]);
    assert!(state.store.message(temp_id).is_none());
    assert_eq!(
        state
            .store
            .message(MessageId::Server(50))
            .and_then(|message| message.content.text()),
        Some("done")
    );
    assert_eq!(state.store.message_count(), 1);
}

#[test]
fn stall_warning_fires_once_after_quiet_period() {
    let mut state = state();

    run_runtime_at(&mut state, frame(turn(PLANS, "incomplete", "thinking")), 1_000);
    run_runtime_at(&mut state, RuntimeAction::Tick, 10_999);
    assert_eq!(notification_text(&state), None);

    run_runtime_at(&mut state, RuntimeAction::Tick, 11_000);
    assert_eq!(notification_text(&state), Some(STALL_WARNING_TEXT));
    assert!(!state.stall_timer.is_armed());
}

#[test]
fn each_incomplete_frame_pushes_the_stall_deadline_out() {
    let mut state = state();

    run_runtime_at(&mut state, frame(turn(PLANS, "incomplete", "a")), 0);
    run_runtime_at(&mut state, frame(turn(PLANS, "incomplete", "ab")), 8_000);
    run_runtime_at(&mut state, RuntimeAction::Tick, 12_000);
    assert_eq!(notification_text(&state), None);

    run_runtime_at(&mut state, frame(turn(PLANS, "complete", "abc")), 15_000);
    run_runtime_at(&mut state, RuntimeAction::Tick, 40_000);
    assert_eq!(notification_text(&state), None);
}

#[test]
fn any_frame_cancels_a_pending_stall_warning() {
    let mut state = state();

    run_runtime_at(&mut state, frame(turn(PLANS, "incomplete", "a")), 0);
    run_runtime_at(
        &mut state,
        frame(serde_json::json!({ "role": "alert", "content": "heads up", "type": "info" })),
        5_000,
    );
    run_runtime_at(&mut state, RuntimeAction::Tick, 15_000);

    assert!(!state.stall_timer.is_armed());
    assert_ne!(notification_text(&state), Some(STALL_WARNING_TEXT));
}

#[test]
fn activity_in_background_conversation_marks_it_unread() {
    let mut state = state();

    run_runtime(&mut state, frame(turn(CHAT, "complete", "ping")));
    run_runtime(&mut state, frame(turn(PLANS, "complete", "pong")));

    assert!(state.store.conversation(CHAT).unwrap().unread_messages);
    assert!(!state.store.conversation(PLANS).unwrap().unread_messages);

    run_user(&mut state, UserAction::LoadConversation(CHAT));
    assert!(!state.store.conversation(CHAT).unwrap().unread_messages);
}

#[test]
fn frames_for_unknown_conversations_are_dropped() {
    let mut state = state();

    let effects = run_runtime(&mut state, frame(turn(ConversationId(999), "complete", "lost")));

    assert!(effects.is_empty());
    assert_eq!(state.store.message_count(), 0);
}
