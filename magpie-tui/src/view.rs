use std::sync::Arc;

use magpie_client::{RenderCommand, RosterEntry};
use magpie_common::{Classification, Identity, RoomName};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, List, ListItem, ListState, Paragraph, StatefulWidget, Widget},
};

use crate::keymap::{KeyCode, KeyEvent};

/// The render sink: room list, message viewport, roster, and input line.
///
/// Holds no chat logic of its own; all state changes arrive as
/// [`RenderCommand`]s from the session core, plus passed-through keys for
/// the input line. The viewport stays pinned to the latest message.
#[derive(Debug, Default)]
pub struct ChatView {
    rooms: Vec<RoomName>,
    active_room: Option<RoomName>,
    lines: Vec<ViewLine>,
    roster: Vec<RosterEntry>,
    roster_selection: Option<usize>,
    input: String,
}

#[derive(Debug)]
struct ViewLine {
    sender: Identity,
    body: Arc<str>,
    classification: Classification,
}

impl ChatView {
    pub fn new(rooms: Vec<RoomName>) -> Self {
        Self {
            rooms,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::AppendMessage {
                sender,
                body,
                classification,
            } => self.lines.push(ViewLine {
                sender,
                body,
                classification,
            }),
            RenderCommand::ClearViewport => self.lines.clear(),
            RenderCommand::SetActiveRoom(room) => self.active_room = Some(room),
            RenderCommand::SetRoster(entries) => {
                // wholesale replacement; any selection pointed at stale entries
                self.roster = entries;
                self.roster_selection = None;
            }
            RenderCommand::ClearInput => self.input.clear(),
            RenderCommand::SetInput(text) => self.input = text,
            // the input line owns keyboard focus whenever the UI is up
            RenderCommand::FocusInput => {}
        }
    }

    /// Edits the input line with a passed-through key. Enter arrives here
    /// only when held with a modifier, which means a literal newline.
    pub fn apply_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Enter => self.input.push('\n'),
            KeyCode::Backspace => {
                self.input.pop();
            }
            _ => tracing::trace!(?key, "ignoring key"),
        }
    }

    pub fn input_line(&self) -> &str {
        &self.input
    }

    pub fn roster_selection(&self) -> Option<usize> {
        self.roster_selection
    }

    pub fn cycle_roster_selection(&mut self) {
        if self.roster.is_empty() {
            self.roster_selection = None;
            return;
        }
        self.roster_selection = Some(match self.roster_selection {
            Some(index) => (index + 1) % self.roster.len(),
            None => 0,
        });
    }

    fn render_rooms(&self, area: Rect, buffer: &mut Buffer) {
        let selected = self
            .rooms
            .iter()
            .position(|room| Some(room) == self.active_room.as_ref());
        let items = self
            .rooms
            .iter()
            .map(|room| ListItem::new(room.to_string()))
            .collect::<Vec<_>>();
        let mut state = ListState::default().with_selected(selected);
        StatefulWidget::render(
            List::new(items)
                .block(Block::bordered().title("Rooms"))
                .highlight_style(Style::new().add_modifier(Modifier::REVERSED)),
            area,
            buffer,
            &mut state,
        );
    }

    fn render_viewport(&self, area: Rect, buffer: &mut Buffer) {
        let text = self
            .lines
            .iter()
            .map(|line| {
                Line::from(vec![
                    Span::styled(
                        format!("{}: ", line.sender),
                        Style::new().add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(line.body.to_string(), style_for(line.classification)),
                ])
            })
            .collect::<Vec<_>>();
        // pin to the bottom so the latest append is always visible
        let visible = area.height.saturating_sub(2) as usize;
        let scroll = self.lines.len().saturating_sub(visible) as u16;
        let title = self.active_room.as_deref().unwrap_or("").to_owned();
        Paragraph::new(text)
            .block(Block::bordered().title(title))
            .scroll((scroll, 0))
            .render(area, buffer);
    }

    fn render_roster(&self, area: Rect, buffer: &mut Buffer) {
        let items = self
            .roster
            .iter()
            .map(|entry| {
                if entry.is_you {
                    ListItem::new(format!("{} (you)", entry.identity))
                } else {
                    ListItem::new(entry.identity.to_string())
                }
            })
            .collect::<Vec<_>>();
        let mut state = ListState::default().with_selected(self.roster_selection);
        StatefulWidget::render(
            List::new(items)
                .block(Block::bordered().title("Active"))
                .highlight_symbol("@")
                .highlight_style(Style::new().add_modifier(Modifier::REVERSED)),
            area,
            buffer,
            &mut state,
        );
    }

    fn render_input(&self, area: Rect, buffer: &mut Buffer) {
        Paragraph::new(self.input.as_str())
            .block(Block::bordered().title("Message"))
            .render(area, buffer);
    }
}

fn style_for(classification: Classification) -> Style {
    match classification {
        Classification::Own => Style::new().fg(Color::Cyan),
        Classification::Other => Style::new(),
        Classification::Private => Style::new().fg(Color::Magenta),
        Classification::System => Style::new()
            .fg(Color::Yellow)
            .add_modifier(Modifier::ITALIC),
    }
}

impl Widget for &ChatView {
    fn render(self, area: Rect, buffer: &mut Buffer) {
        let columns = Layout::horizontal([
            Constraint::Length(18),
            Constraint::Min(20),
            Constraint::Length(22),
        ])
        .split(area);
        let center = Layout::vertical([Constraint::Min(1), Constraint::Length(3)]).split(columns[1]);
        self.render_rooms(columns[0], buffer);
        self.render_viewport(center[0], buffer);
        self.render_input(center[1], buffer);
        self.render_roster(columns[2], buffer);
    }
}
