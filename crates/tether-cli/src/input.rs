use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyModifiers;
use tether_core::ConversationId;
use tether_core::SidebarToggle;
use tether_core::SpaceId;
use tether_core::UserAction;

use crate::view::ChatView;

pub const HELP_TEXT: &str = "/open <id> /close /space [id|none] /new /rename <title> /move <space|none> \
/delete /archive /archived /newspace /renamespace <name> /deletespace /dismiss /quit";

#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    Dispatch(UserAction),
    Quit,
}

/// The line being typed plus a one-line hint shown under it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputLine {
    text: String,
    hint: Option<String>,
}

impl InputLine {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }
}

pub fn handle_key(key: KeyEvent, input: &mut InputLine, view: &ChatView) -> Option<UiCommand> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => Some(UiCommand::Quit),
        KeyCode::Char('b') if ctrl => Some(UiCommand::Dispatch(UserAction::ToggleSidebar(
            SidebarToggle::Toggle,
        ))),
        KeyCode::Char('x') if ctrl => Some(UiCommand::Dispatch(UserAction::ToggleXray)),
        // Pauses live updates while reading; frames queue until released.
        KeyCode::Char('f') if ctrl => Some(UiCommand::Dispatch(UserAction::SetHighlighting(
            !view.frozen,
        ))),
        KeyCode::Tab => cycle_tab(view, true),
        KeyCode::BackTab => cycle_tab(view, false),
        KeyCode::Esc => {
            if input.text.is_empty() {
                Some(UiCommand::Dispatch(UserAction::DismissNotification))
            } else {
                input.text.clear();
                input.hint = None;
                None
            }
        }
        KeyCode::Backspace => {
            input.text.pop();
            None
        }
        KeyCode::Enter => submit(input, view),
        KeyCode::Char(c) if !ctrl => {
            input.text.push(c);
            input.hint = None;
            None
        }
        _ => None,
    }
}

fn cycle_tab(view: &ChatView, forward: bool) -> Option<UiCommand> {
    if view.tabs.is_empty() {
        return None;
    }
    let len = view.tabs.len();
    let next = match view
        .selected
        .and_then(|selected| view.tabs.iter().position(|(id, _)| *id == selected))
    {
        Some(index) if forward => (index + 1) % len,
        Some(index) => (index + len - 1) % len,
        None => 0,
    };
    let id = view.tabs[next].0;
    Some(UiCommand::Dispatch(UserAction::LoadConversation(id)))
}

fn submit(input: &mut InputLine, view: &ChatView) -> Option<UiCommand> {
    let text = input.text.trim().to_string();
    if text.is_empty() {
        return None;
    }
    let outcome = match text.strip_prefix('/') {
        Some("help") => Err(HELP_TEXT.to_string()),
        Some(command) => parse_command(command, view),
        None => match view.selected {
            Some(conversation_id) => Ok(UiCommand::Dispatch(UserAction::SubmitMessage {
                conversation_id,
                text,
            })),
            None => Err("open a conversation first: /open <id>".to_string()),
        },
    };
    match outcome {
        Ok(command) => {
            input.text.clear();
            input.hint = None;
            Some(command)
        }
        Err(hint) => {
            input.hint = Some(hint);
            None
        }
    }
}

pub fn parse_command(command: &str, view: &ChatView) -> Result<UiCommand, String> {
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    let action = match name {
        "quit" | "q" => return Ok(UiCommand::Quit),
        "open" => UserAction::LoadConversation(parse_conversation(rest)?),
        "close" => UserAction::CloseTab(selected_conversation(view)?),
        "space" => UserAction::LoadSpace(match rest {
            "" => None,
            other => Some(parse_space(other)?),
        }),
        "new" => UserAction::CreateConversation(view.selected_space),
        "rename" => UserAction::RenameConversation {
            conversation_id: selected_conversation(view)?,
            title: required(rest, "/rename <title>")?,
        },
        "move" => UserAction::MoveConversationToSpace {
            conversation_id: selected_conversation(view)?,
            space_id: parse_space(rest)?,
        },
        "delete" => UserAction::DeleteConversation(selected_conversation(view)?),
        "archive" => UserAction::ArchiveMessages(selected_conversation(view)?),
        "archived" => UserAction::ToggleArchivedMessages(selected_conversation(view)?),
        "newspace" => UserAction::CreateSpace,
        "renamespace" => UserAction::RenameSpace {
            space_id: selected_space(view)?,
            name: required(rest, "/renamespace <name>")?,
        },
        "deletespace" => UserAction::DeleteSpace(selected_space(view)?),
        "dismiss" => UserAction::DismissNotification,
        other => return Err(format!("unknown command /{other}; try /help")),
    };
    Ok(UiCommand::Dispatch(action))
}

fn parse_conversation(raw: &str) -> Result<ConversationId, String> {
    raw.parse::<i64>()
        .map(ConversationId)
        .map_err(|_| format!("not a conversation id: {raw:?}"))
}

fn parse_space(raw: &str) -> Result<SpaceId, String> {
    if raw.eq_ignore_ascii_case("none") {
        return Ok(SpaceId::NONE);
    }
    raw.parse::<i64>()
        .map(SpaceId)
        .map_err(|_| format!("not a space id: {raw:?}"))
}

fn required(raw: &str, usage: &str) -> Result<String, String> {
    if raw.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(raw.to_string())
    }
}

fn selected_conversation(view: &ChatView) -> Result<ConversationId, String> {
    view.selected
        .ok_or_else(|| "no conversation is open".to_string())
}

fn selected_space(view: &ChatView) -> Result<SpaceId, String> {
    match view.selected_space {
        Some(space_id) if !space_id.is_sentinel() => Ok(space_id),
        _ => Err("select a space first: /space <id>".to_string()),
    }
}
