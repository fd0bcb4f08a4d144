use serde_json::json;

use super::*;
use pretty_assertions::assert_eq;

fn submit(state: &mut SyncState, text: &str) -> Vec<SyncEffect> {
    run_user(
        state,
        UserAction::SubmitMessage {
            conversation_id: PLANS,
            text: text.to_string(),
        },
    )
}

fn echo(id: i64, text: &str) -> RuntimeAction {
    frame(json!({
        "id": id,
        "conversation_id": PLANS.0,
        "role": "user",
        "content": { "text": text },
    }))
}

#[test]
fn submitted_message_is_shown_with_temp_id_and_sent() {
    let mut state = state();

    let effects = submit(&mut state, "hello");

    let ids = &state.store.conversation(PLANS).unwrap().message_ids;
    assert_eq!(ids.len(), 1);
    assert!(ids[0].is_temp());
    assert_eq!(
        effects,
        vec![SyncEffect::SendFrame(json!({
            "conversation_id": 2,
            "role": "user",
            "content": { "text": "hello" },
        }))]
    );
}

#[test]
fn server_echo_replaces_the_temp_message() {
    let mut state = state();
    submit(&mut state, "hello");
    let temp_id = state.store.conversation(PLANS).unwrap().message_ids[0];

    run_runtime(&mut state, echo(90, "hello"));

    assert_eq!(
        state.store.conversation(PLANS).unwrap().message_ids,
        vec![MessageId::Server(90)]
    );
    assert!(state.store.message(temp_id).is_none());
    assert_eq!(state.store.message_count(), 1);
    assert_eq!(
        state.store.message(MessageId::Server(90)).map(|m| m.role.clone()),
        Some(Role::User)
    );
}

#[test]
fn echo_with_different_text_is_a_new_message() {
    let mut state = state();
    submit(&mut state, "hello");

    run_runtime(&mut state, echo(91, "something else"));

    let ids = &state.store.conversation(PLANS).unwrap().message_ids;
    assert_eq!(ids.len(), 2);
    assert!(ids[0].is_temp());
    assert_eq!(ids[1], MessageId::Server(91));
}

#[test]
fn repeated_echo_does_not_duplicate() {
    let mut state = state();
    submit(&mut state, "hello");

    run_runtime(&mut state, echo(90, "hello"));
    run_runtime(&mut state, echo(90, "hello"));

    assert_eq!(
        state.store.conversation(PLANS).unwrap().message_ids,
        vec![MessageId::Server(90)]
    );
    assert_eq!(state.store.message_count(), 1);
}

#[test]
fn submit_while_disconnected_keeps_local_copy_and_sends_nothing() {
    let mut state = state();
    run_runtime(
        &mut state,
        RuntimeAction::ConnectionChanged(ConnectionPhase::Closed),
    );
    assert!(!state.connection.is_active);

    let effects = submit(&mut state, "hello");

    assert!(effects.is_empty());
    assert_eq!(
        transcript(&state, PLANS),
        vec![(Role::User, "hello".to_string(), None)]
    );
    assert!(state.store.conversation_messages(PLANS)[0].id.is_temp());
    let notification = state.notifications.current().unwrap();
    assert_eq!(notification.message, NOT_CONNECTED_TEXT);
    assert_eq!(notification.kind, NotificationKind::Error);
    assert!(!notification.sticky);
}

#[test]
fn send_failure_after_submit_keeps_the_local_message() {
    let mut state = state();
    submit(&mut state, "hello");

    run_runtime(
        &mut state,
        RuntimeAction::SendFailed("socket closed".to_string()),
    );

    assert_eq!(state.store.message_count(), 1);
    assert_eq!(notification_text(&state), Some(NOT_CONNECTED_TEXT));
}

#[test]
fn fetched_history_merges_in_id_order() {
    let mut state = state();
    run_runtime(&mut state, echo(5, "five"));

    run_runtime(
        &mut state,
        RuntimeAction::MessagesLoaded {
            conversation_id: PLANS,
            messages: serde_json::from_value(json!([
                { "id": 4, "role": "assistant", "content": { "text": "four" } },
                { "id": 3, "role": "user", "content": { "text": "three" } },
                { "id": 5, "role": "user", "content": { "text": "five" } }
            ]))
            .unwrap(),
        },
    );

    assert_eq!(
        state.store.conversation(PLANS).unwrap().message_ids,
        vec![MessageId::Server(3), MessageId::Server(4), MessageId::Server(5)]
    );
    assert_eq!(state.store.message_count(), 3);
    assert!(!state.interaction.messages_loading);
}

#[test]
fn archiving_hides_messages_until_toggled() {
    let mut state = state();
    run_runtime(&mut state, echo(5, "five"));

    run_runtime(&mut state, RuntimeAction::MessagesArchived(PLANS));
    assert!(state.store.visible_messages(PLANS).is_empty());

    run_user(&mut state, UserAction::ToggleArchivedMessages(PLANS));
    assert_eq!(state.store.visible_messages(PLANS).len(), 1);
}
