use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Tabs, Wrap};
use ratatui::Terminal;
use tether_core::{NotificationKind, Route, UserAction};
use tokio::sync::{mpsc, watch};

use crate::input::{handle_key, InputLine, UiCommand};
use crate::view::{ChatView, NoticeView, SidebarEntry, Speaker, TranscriptEntry};

const KEY_POLL: Duration = Duration::from_millis(100);

struct TuiGuard;

impl Drop for TuiGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
    }
}

#[derive(Clone, Copy)]
struct UiPalette {
    accent: Color,
    accent_alt: Color,
    success: Color,
    warning: Color,
    danger: Color,
    muted: Color,
    border: Color,
}

const PALETTE: UiPalette = UiPalette {
    accent: Color::Cyan,
    accent_alt: Color::Blue,
    success: Color::Green,
    warning: Color::Yellow,
    danger: Color::Red,
    muted: Color::DarkGray,
    border: Color::Gray,
};

/// Runs the terminal until the user quits or the session goes away.
/// Dropping `commands` on return is what stops the session.
pub async fn run(
    mut views: watch::Receiver<ChatView>,
    mut routes: watch::Receiver<Route>,
    commands: mpsc::Sender<UserAction>,
) -> anyhow::Result<()> {
    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen, crossterm::cursor::Hide)?;
    let _guard = TuiGuard;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    let (keys_tx, mut keys_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || read_keys(keys_tx));

    let mut input = InputLine::default();
    loop {
        {
            let view = views.borrow();
            let route = *routes.borrow();
            terminal.draw(|f| draw(f, &view, route, &input))?;
        }

        let key = tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                continue;
            }
            changed = routes.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                continue;
            }
            key = keys_rx.recv() => match key {
                Some(key) => key,
                None => return Ok(()),
            },
        };

        let view = views.borrow().clone();
        match handle_key(key, &mut input, &view) {
            Some(UiCommand::Quit) => return Ok(()),
            Some(UiCommand::Dispatch(action)) => {
                if commands.send(action).await.is_err() {
                    return Ok(());
                }
            }
            None => {}
        }
    }
}

fn read_keys(keys: mpsc::UnboundedSender<KeyEvent>) {
    loop {
        match event::poll(KEY_POLL) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if keys.send(key).is_err() {
                        return;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "terminal read failed");
                    return;
                }
            },
            Ok(false) => {
                if keys.is_closed() {
                    return;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "terminal poll failed");
                return;
            }
        }
    }
}

fn draw(f: &mut ratatui::Frame, view: &ChatView, route: Route, input: &InputLine) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Min(0),    // Body
            Constraint::Length(1), // Notification
            Constraint::Length(3), // Input
        ])
        .split(f.area());

    render_header(f, chunks[0], view);

    let mut main_area = chunks[1];
    if view.sidebar_open {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(28), Constraint::Min(0)])
            .split(chunks[1]);
        render_sidebar(f, cols[0], view);
        main_area = cols[1];
    }
    if let Some(xray) = view.xray.as_deref() {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(40)])
            .split(main_area);
        main_area = cols[0];
        let panel = Paragraph::new(xray.to_string())
            .style(Style::default().fg(PALETTE.muted))
            .wrap(Wrap { trim: false })
            .block(bordered("X-ray"));
        f.render_widget(panel, cols[1]);
    }

    match route {
        Route::Chat => render_chat(f, main_area, view),
        Route::Conversations => render_conversation_list(f, main_area, view),
        Route::Welcome => render_banner(
            f,
            main_area,
            "Onboarding required",
            "Finish setting up your account in the browser, then restart tether.",
        ),
        Route::Login => render_banner(
            f,
            main_area,
            "Not logged in",
            "Log in through the browser and set server.session_cookie in the config file.",
        ),
    }

    render_notification(f, chunks[2], view.notification.as_ref());
    render_input(f, chunks[3], input);
}

fn bordered(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(PALETTE.border))
        .title(title)
}

fn render_header(f: &mut ratatui::Frame, area: Rect, view: &ChatView) {
    let (label, color) = if view.connected {
        ("connected", PALETTE.success)
    } else {
        (view.phase.label(), PALETTE.danger)
    };
    let mut spans = vec![
        Span::styled(
            "tether ",
            Style::default()
                .fg(PALETTE.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("[{label}]"), Style::default().fg(color)),
    ];
    if let Some(user) = view.user.as_deref() {
        spans.push(Span::styled(format!(" {user}"), Style::default().fg(PALETTE.muted)));
    }
    if view.frozen {
        spans.push(Span::styled(
            format!(" paused ({} queued)", view.buffered),
            Style::default().fg(PALETTE.warning),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_sidebar(f: &mut ratatui::Frame, area: Rect, view: &ChatView) {
    let items: Vec<ListItem> = view
        .sidebar
        .iter()
        .map(|entry| match entry {
            SidebarEntry::Space { name, selected, .. } => {
                let mut style = Style::default()
                    .fg(PALETTE.accent_alt)
                    .add_modifier(Modifier::BOLD);
                if *selected {
                    style = style.add_modifier(Modifier::UNDERLINED);
                }
                ListItem::new(Line::from(Span::styled(name.clone(), style)))
            }
            SidebarEntry::Conversation {
                id,
                title,
                unread,
                selected,
            } => {
                let marker = if *unread { "*" } else { " " };
                let style = if *selected {
                    Style::default().fg(PALETTE.accent).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(vec![
                    Span::styled(marker, Style::default().fg(PALETTE.warning)),
                    Span::styled(format!("{id:>4} "), Style::default().fg(PALETTE.muted)),
                    Span::styled(title.clone(), style),
                ]))
            }
        })
        .collect();
    f.render_widget(List::new(items).block(bordered("Spaces")), area);
}

fn render_chat(f: &mut ratatui::Frame, area: Rect, view: &ChatView) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let titles: Vec<Line> = view
        .tabs
        .iter()
        .map(|(_, title)| Line::from(title.clone()))
        .collect();
    let selected_tab = view
        .selected
        .and_then(|selected| view.tabs.iter().position(|(id, _)| *id == selected))
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .block(bordered("Open"))
        .select(selected_tab)
        .highlight_style(
            Style::default()
                .fg(PALETTE.accent)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, sections[0]);

    let mut title = view.title.clone().unwrap_or_else(|| "Chat".to_string());
    if view.loading {
        title.push_str(" (loading)");
    } else if view.awaiting_reply {
        title.push_str(" (replying)");
    }
    let lines = transcript_lines(&view.transcript);
    let inner_height = sections[1].height.saturating_sub(2) as usize;
    let scroll = lines.len().saturating_sub(inner_height);
    let transcript = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((u16::try_from(scroll).unwrap_or(u16::MAX), 0))
        .block(bordered(&title));
    f.render_widget(transcript, sections[1]);
}

fn speaker_style(speaker: Speaker) -> Style {
    let color = match speaker {
        Speaker::User => PALETTE.accent,
        Speaker::Assistant => PALETTE.success,
        Speaker::Other => PALETTE.warning,
    };
    Style::default().fg(color)
}

fn transcript_lines(entries: &[TranscriptEntry]) -> Vec<Line<'static>> {
    let mut out = Vec::new();
    for entry in entries {
        let mut header = vec![Span::styled(
            entry.role.clone(),
            speaker_style(entry.speaker).add_modifier(Modifier::BOLD),
        )];
        if entry.streaming {
            header.push(Span::styled(" ...", Style::default().fg(PALETTE.muted)));
        }
        if entry.pending {
            header.push(Span::styled(" (sending)", Style::default().fg(PALETTE.muted)));
        }
        if entry.archived {
            header.push(Span::styled(" [archived]", Style::default().fg(PALETTE.muted)));
        }
        out.push(Line::from(header));

        let mut in_code = false;
        for raw in entry.text.split('\n') {
            if raw.trim_start().starts_with("```") {
                in_code = !in_code;
                continue;
            }
            let style = if in_code {
                Style::default().fg(PALETTE.accent_alt)
            } else {
                Style::default()
            };
            out.push(Line::from(Span::styled(format!("  {raw}"), style)));
        }
        out.push(Line::default());
    }
    out
}

fn render_conversation_list(f: &mut ratatui::Frame, area: Rect, view: &ChatView) {
    let items: Vec<ListItem> = if view.space_conversations.is_empty() {
        vec![ListItem::new(Span::styled(
            "No conversations yet. /new starts one.",
            Style::default().fg(PALETTE.muted),
        ))]
    } else {
        view.space_conversations
            .iter()
            .map(|(id, title)| {
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{id:>4} "), Style::default().fg(PALETTE.muted)),
                    Span::raw(title.clone()),
                ]))
            })
            .collect()
    };
    f.render_widget(
        List::new(items).block(bordered("Conversations (/open <id>)")),
        area,
    );
}

fn render_banner(f: &mut ratatui::Frame, area: Rect, title: &str, body: &str) {
    let text = Paragraph::new(body.to_string())
        .style(Style::default().fg(PALETTE.warning))
        .wrap(Wrap { trim: true })
        .block(bordered(title));
    f.render_widget(text, area);
}

fn render_notification(f: &mut ratatui::Frame, area: Rect, notice: Option<&NoticeView>) {
    let Some(notice) = notice else {
        return;
    };
    let color = match notice.kind {
        NotificationKind::Error | NotificationKind::ToolError => PALETTE.danger,
        NotificationKind::Success | NotificationKind::ToolSuccess => PALETTE.success,
        NotificationKind::Info | NotificationKind::ToolStart => PALETTE.accent,
    };
    let mut spans = vec![Span::styled(
        notice.text.clone(),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )];
    if notice.sticky {
        spans.push(Span::styled(" (esc to dismiss)", Style::default().fg(PALETTE.muted)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_input(f: &mut ratatui::Frame, area: Rect, input: &InputLine) {
    let title = input.hint().unwrap_or("Message (/help for commands)");
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if input.hint().is_some() {
            PALETTE.warning
        } else {
            PALETTE.border
        }))
        .title(title);
    f.render_widget(Paragraph::new(format!("> {}", input.text())).block(block), area);
}
