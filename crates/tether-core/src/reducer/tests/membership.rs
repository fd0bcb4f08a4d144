use serde_json::json;

use super::*;
use pretty_assertions::assert_eq;

fn listed_in(state: &SyncState, space_id: SpaceId) -> Vec<ConversationId> {
    state.store.space(space_id).unwrap().conversation_ids.clone()
}

#[test]
fn moving_a_conversation_updates_both_spaces() {
    let mut state = state();

    let effects = run_user(
        &mut state,
        UserAction::MoveConversationToSpace {
            conversation_id: PLANS,
            space_id: HOME,
        },
    );

    assert_eq!(listed_in(&state, WORK), Vec::<ConversationId>::new());
    assert_eq!(listed_in(&state, HOME), vec![PLANS]);
    assert_eq!(state.store.conversation(PLANS).unwrap().space_id, HOME);
    assert!(state.store.membership_is_consistent());

    let [SyncEffect::SaveConversationSettings {
        conversation_id,
        settings,
    }] = effects.as_slice()
    else {
        panic!("expected a settings save, got {effects:?}");
    };
    assert_eq!(*conversation_id, PLANS);
    assert_eq!(settings.value("space"), Some(&json!(20)));
}

#[test]
fn moving_to_none_space_leaves_no_real_space_listing_it() {
    let mut state = state();

    let effects = run_user(
        &mut state,
        UserAction::MoveConversationToSpace {
            conversation_id: PLANS,
            space_id: SpaceId::NONE,
        },
    );

    assert_eq!(state.store.conversation(PLANS).unwrap().space_id, SpaceId::NONE);
    assert!(state
        .store
        .spaces()
        .filter(|space| !space.id.is_sentinel())
        .all(|space| !space.conversation_ids.contains(&PLANS)));
    assert!(state.store.membership_is_consistent());
    assert!(matches!(
        effects.as_slice(),
        [SyncEffect::SaveConversationSettings { settings, .. }]
            if settings.value("space") == Some(&serde_json::Value::Null)
    ));
}

#[test]
fn moving_into_unknown_space_changes_nothing() {
    let mut state = state();

    let effects = run_user(
        &mut state,
        UserAction::MoveConversationToSpace {
            conversation_id: PLANS,
            space_id: SpaceId(404),
        },
    );

    assert!(effects.is_empty());
    assert_eq!(state.store.conversation(PLANS).unwrap().space_id, WORK);
    assert_eq!(listed_in(&state, WORK), vec![PLANS]);
}

#[test]
fn move_reuses_loaded_settings_for_that_conversation() {
    let mut state = state();
    run_runtime(
        &mut state,
        RuntimeAction::ConversationSettingsLoaded {
            conversation_id: PLANS,
            settings: crate::persistence::ConversationSettings {
                conversation: json!({ "title": { "value": "Plans" } }),
                program: json!({ "model": "small" }),
            },
        },
    );

    let effects = run_user(
        &mut state,
        UserAction::MoveConversationToSpace {
            conversation_id: PLANS,
            space_id: HOME,
        },
    );

    let [SyncEffect::SaveConversationSettings { settings, .. }] = effects.as_slice() else {
        panic!("expected a settings save, got {effects:?}");
    };
    assert_eq!(settings.value("title"), Some(&json!("Plans")));
    assert_eq!(settings.program, json!({ "model": "small" }));
    assert_eq!(
        state.conversation_settings.as_ref().map(|(_, s)| s.value("space")),
        Some(Some(&json!(20)))
    );
}

#[test]
fn deleted_space_sends_its_conversations_to_none() {
    let mut state = state();

    let effects = run_runtime(&mut state, RuntimeAction::SpaceDeleted(WORK));

    assert!(state.store.space(WORK).is_none());
    assert_eq!(state.store.conversation(PLANS).unwrap().space_id, SpaceId::NONE);
    assert_eq!(state.selection.space_id, None);
    assert!(state.store.membership_is_consistent());
    assert!(matches!(effects.as_slice(), [SyncEffect::SaveAppState(_)]));
    assert_eq!(notification_text(&state), Some("Space deleted"));
}

#[test]
fn none_space_cannot_be_deleted() {
    let mut state = state();

    assert!(run_user(&mut state, UserAction::DeleteSpace(SpaceId::NONE)).is_empty());
    assert!(run_runtime(&mut state, RuntimeAction::SpaceDeleted(SpaceId::NONE)).is_empty());
    assert!(state.store.space(SpaceId::NONE).is_some());
}

#[test]
fn deleted_conversation_leaves_tabs_selection_and_space() {
    let mut state = state();
    run_runtime(&mut state, frame(turn(PLANS, "complete", "bye")));

    let effects = run_runtime(&mut state, RuntimeAction::ConversationDeleted(PLANS));

    assert!(state.store.conversation(PLANS).is_none());
    assert_eq!(state.store.message_count(), 0);
    assert!(!state.open_tabs().contains(&PLANS));
    assert_eq!(state.selection.conversation_id, None);
    assert_eq!(listed_in(&state, WORK), Vec::<ConversationId>::new());
    assert!(matches!(
        effects.as_slice(),
        [
            SyncEffect::SaveAppState(_),
            SyncEffect::Navigate(Route::Conversations)
        ]
    ));
}

#[test]
fn created_conversation_joins_its_space_and_opens() {
    let mut state = state();

    let effects = run_runtime(
        &mut state,
        RuntimeAction::ConversationCreated(ConversationRecord {
            id: ConversationId(7),
            title: "New".to_string(),
            space_id: Some(HOME),
            excerpt: None,
        }),
    );

    assert_eq!(listed_in(&state, HOME), vec![ConversationId(7)]);
    assert_eq!(state.selection.conversation_id, Some(ConversationId(7)));
    assert_eq!(state.open_tabs().first(), Some(&ConversationId(7)));
    assert_eq!(effects.last(), Some(&SyncEffect::Navigate(Route::Chat)));
    assert!(state.store.membership_is_consistent());
}

#[test]
fn rename_space_updates_store_and_requests_save() {
    let mut state = state();

    let effects = run_user(
        &mut state,
        UserAction::RenameSpace {
            space_id: HOME,
            name: "House".to_string(),
        },
    );

    assert_eq!(state.store.space(HOME).unwrap().name, "House");
    assert_eq!(
        effects,
        vec![SyncEffect::UpdateSpace {
            space_id: HOME,
            name: "House".to_string()
        }]
    );
}

#[test]
fn spaces_options_lists_none_first() {
    let state = state();
    let options = state.store.spaces_options();
    assert_eq!(options[0], (SpaceId::NONE, "None".to_string()));
    assert_eq!(options.len(), 3);
}
