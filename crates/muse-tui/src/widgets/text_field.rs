//! TextField — wraps tui-input for single-line editing in panes.
//!
//! Used for the prompt, style, and title fields in the composer and for the
//! library search. Esc cancels the edit and restores the value the field had
//! when editing began; Enter keeps the new value.

use ratatui::crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use tui_input::{backend::crossterm::EventHandler, Input};

use crate::theme::{C_FILTER_BG, C_FILTER_FG, C_MUTED, C_PRIMARY};

pub enum FieldAction {
    Changed(String),
    Confirmed,
    Cancelled,
}

pub struct TextField {
    input: Input,
    editing: bool,
    /// Value to restore when an edit is cancelled.
    undo: String,
    placeholder: String,
    max_chars: Option<usize>,
}

impl TextField {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            input: Input::default(),
            editing: false,
            undo: String::new(),
            placeholder: placeholder.into(),
            max_chars: None,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }

    pub fn begin_edit(&mut self) {
        self.undo = self.input.value().to_string();
        self.editing = true;
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn text(&self) -> &str {
        self.input.value()
    }

    pub fn set_text(&mut self, value: &str) {
        self.input = Input::new(value.to_string());
    }

    pub fn clear(&mut self) {
        self.input = Input::default();
    }

    pub fn char_count(&self) -> usize {
        self.input.value().chars().count()
    }

    /// Handle a key while editing.
    pub fn handle_key(&mut self, key: KeyEvent) -> FieldAction {
        match key.code {
            KeyCode::Esc => {
                self.input = Input::new(self.undo.clone());
                self.editing = false;
                FieldAction::Cancelled
            }
            KeyCode::Enter => {
                self.editing = false;
                FieldAction::Confirmed
            }
            _ => {
                self.input
                    .handle_event(&ratatui::crossterm::event::Event::Key(key));
                if let Some(max) = self.max_chars {
                    if self.input.value().chars().count() > max {
                        let truncated: String = self.input.value().chars().take(max).collect();
                        self.input = Input::new(truncated);
                    }
                }
                FieldAction::Changed(self.input.value().to_string())
            }
        }
    }

    /// Render the field with a label prefix. Shows the cursor while editing.
    pub fn draw(&self, frame: &mut Frame, area: Rect, label: &str) {
        let prefix = format!("{label} ");
        let inner_w = area.width.saturating_sub(prefix.len() as u16 + 1) as usize;
        let scroll = self.input.visual_scroll(inner_w);
        let value = self.input.value();

        let value_span = if value.is_empty() && !self.editing {
            Span::styled(self.placeholder.clone(), Style::default().fg(C_MUTED))
        } else {
            let shown: String = value.chars().skip(scroll).collect();
            let style = if self.editing {
                Style::default().fg(C_FILTER_FG)
            } else {
                Style::default().fg(C_PRIMARY)
            };
            Span::styled(shown, style)
        };

        let mut line = vec![Span::styled(prefix.clone(), Style::default().fg(C_MUTED))];
        line.push(value_span);

        let mut paragraph = Paragraph::new(Line::from(line));
        if self.editing {
            paragraph = paragraph.style(Style::default().bg(C_FILTER_BG));
        }
        frame.render_widget(paragraph, area);

        if self.editing {
            let cursor_x =
                area.x + prefix.len() as u16 + (self.input.visual_cursor() - scroll) as u16;
            frame.set_cursor_position((cursor_x.min(area.x + area.width.saturating_sub(1)), area.y));
        }
    }
}
