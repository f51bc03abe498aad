//! Status bar — bottom line with mode, generation state, and keybindings.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::action::PanelId;
use crate::theme::{C_ERROR, C_FILTER_FG, C_GENERATING, C_MUTED, C_SECONDARY};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputMode {
    Normal,
    Edit,
    Filter,
}

impl InputMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Edit => "EDIT",
            Self::Filter => "FILTER",
        }
    }

    pub fn color(self) -> ratatui::style::Color {
        match self {
            Self::Normal => C_SECONDARY,
            Self::Edit => C_FILTER_FG,
            Self::Filter => C_FILTER_FG,
        }
    }
}

/// One line: mode badge, generation spinner/status on the left, keys on the
/// right (an error or status message wins over keys when present).
pub fn draw_status_bar(
    frame: &mut Frame,
    area: Rect,
    mode: InputMode,
    focus: PanelId,
    generating: Option<&str>,
    error: Option<&str>,
    status: Option<&str>,
) {
    let mut spans = vec![Span::styled(
        format!(" {} ", mode.label()),
        Style::default()
            .fg(mode.color())
            .add_modifier(Modifier::BOLD),
    )];

    if let Some(status) = generating {
        spans.push(Span::styled(
            format!("♪ {status} "),
            Style::default().fg(C_GENERATING),
        ));
    }

    if let Some(error) = error {
        spans.push(Span::styled(error.to_string(), Style::default().fg(C_ERROR)));
    } else if let Some(status) = status {
        spans.push(Span::styled(
            status.to_string(),
            Style::default().fg(C_SECONDARY),
        ));
    } else {
        let keys = match (mode, focus) {
            (InputMode::Edit, _) => " type  Enter keep  Esc revert",
            (InputMode::Filter, _) => " type to search  Enter keep  Esc clear",
            (InputMode::Normal, PanelId::Composer) => {
                " e prompt  g generate  x cancel  M model  c custom  i instr  v vocals  s style  t title  j/k genre  Enter pick  a enhance  Tab library  q quit"
            }
            (InputMode::Normal, PanelId::Library) => {
                " j/k select  Enter play  d delete  / search  y copy url  Space pause  n/p track  ,/. seek  ←→ vol  m mute  Tab composer  q quit"
            }
        };
        spans.push(Span::styled(keys, Style::default().fg(C_MUTED)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
