//! Composer panel — prompt entry, generation settings, genre chips, and the
//! latest batch of generated tracks.

use ratatui::crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use muse_core::api::{Model, VocalGender};
use muse_core::library::Library;

use crate::action::Action;
use crate::generation::GenerationOptions;
use crate::theme::{
    style_focused_border, style_muted, style_secondary, style_unfocused_border, C_ACCENT, C_BADGE,
    C_FRESH, C_GENERATING, C_MUTED, C_PRIMARY, C_SECONDARY, C_SELECTION_BG,
};
use crate::widgets::text_field::{FieldAction, TextField};

pub const PROMPT_MAX_CHARS: usize = 10_000;

/// Appended by the enhance shortcut; mirrors the backend's preferred phrasing
/// for polished output.
const ENHANCE_SUFFIX: &str = " - make it radio-ready with professional production quality";

const GENRES: [&str; 20] = [
    "Afrobeats",
    "Hip-Hop",
    "Jazz",
    "Pop",
    "R&B",
    "Electronic",
    "Classical",
    "Rock",
    "Lo-Fi",
    "Reggae",
    "Soul",
    "Ambient",
    "Country",
    "Funk",
    "Gospel",
    "Latin",
    "Metal",
    "Blues",
    "Indie",
    "Dancehall",
];

/// Which field is currently being edited, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
enum EditTarget {
    Prompt,
    Style,
    Title,
}

pub struct Composer {
    prompt: TextField,
    style: TextField,
    title: TextField,
    editing: Option<EditTarget>,
    model: Model,
    custom_mode: bool,
    instrumental: bool,
    vocal_gender: VocalGender,
    genre_cursor: usize,
    selected_genre: Option<usize>,
    /// Track ids from the most recent successful generation.
    recent: Vec<String>,
}

impl Composer {
    pub fn new() -> Self {
        Self {
            prompt: TextField::new("Type a prompt...").with_max_chars(PROMPT_MAX_CHARS),
            style: TextField::new("style"),
            title: TextField::new("title"),
            editing: None,
            model: Model::default(),
            custom_mode: false,
            instrumental: false,
            vocal_gender: VocalGender::default(),
            genre_cursor: 0,
            selected_genre: None,
            recent: Vec::new(),
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    pub fn prompt_text(&self) -> &str {
        self.prompt.text()
    }

    pub fn options(&self) -> GenerationOptions {
        GenerationOptions {
            model: self.model,
            custom_mode: self.custom_mode,
            instrumental: self.instrumental,
            style: self.style.text().to_string(),
            title: self.title.text().to_string(),
            vocal_gender: self.vocal_gender,
            negative_tags: String::new(),
        }
    }

    /// Remember the ids of the latest batch so they can be highlighted.
    pub fn set_recent(&mut self, ids: Vec<String>) {
        self.recent = ids;
    }

    pub fn recent_ids(&self) -> &[String] {
        &self.recent
    }

    /// Toggle the genre under the cursor: picking one copies it into the
    /// style field and switches custom mode on; picking it again clears it.
    fn toggle_genre(&mut self) {
        if self.selected_genre == Some(self.genre_cursor) {
            self.selected_genre = None;
            self.style.clear();
        } else {
            self.selected_genre = Some(self.genre_cursor);
            self.style.set_text(GENRES[self.genre_cursor]);
            self.custom_mode = true;
        }
    }

    /// Key handling while one of the text fields is active.
    pub fn handle_edit_key(&mut self, key: KeyEvent) -> Vec<Action> {
        let Some(target) = self.editing else {
            return Vec::new();
        };
        let field = match target {
            EditTarget::Prompt => &mut self.prompt,
            EditTarget::Style => &mut self.style,
            EditTarget::Title => &mut self.title,
        };
        let action = field.handle_key(key);
        let has_text = !field.text().trim().is_empty();

        match action {
            FieldAction::Confirmed => {
                self.editing = None;
                // Typing a style or title is custom-mode intent.
                if matches!(target, EditTarget::Style | EditTarget::Title) && has_text {
                    self.custom_mode = true;
                }
                if target == EditTarget::Style {
                    // Keep the chip highlight in sync with a hand-typed style.
                    let style_text = self.style.text().to_string();
                    self.selected_genre = GENRES.iter().position(|g| *g == style_text);
                }
            }
            FieldAction::Cancelled => self.editing = None,
            FieldAction::Changed(_) => {}
        }
        Vec::new()
    }

    /// Key handling in normal mode with this panel focused.
    pub fn handle_key(&mut self, key: KeyEvent, generating: bool) -> Vec<Action> {
        match key.code {
            KeyCode::Char('e') if !generating => {
                self.editing = Some(EditTarget::Prompt);
                self.prompt.begin_edit();
            }
            KeyCode::Char('s') if !generating => {
                self.editing = Some(EditTarget::Style);
                self.style.begin_edit();
            }
            KeyCode::Char('t') if !generating => {
                self.editing = Some(EditTarget::Title);
                self.title.begin_edit();
            }
            KeyCode::Char('g') => return vec![Action::Generate],
            KeyCode::Char('x') => return vec![Action::CancelGeneration],
            KeyCode::Char('M') if !generating => {
                self.model = self.model.next();
            }
            KeyCode::Char('c') if !generating => {
                self.custom_mode = !self.custom_mode;
            }
            KeyCode::Char('i') if !generating => {
                self.instrumental = !self.instrumental;
            }
            KeyCode::Char('v') if !generating => {
                self.vocal_gender = self.vocal_gender.toggle();
            }
            KeyCode::Char('a') if !generating => {
                let trimmed = self.prompt.text().trim();
                if !trimmed.is_empty() && !trimmed.ends_with(ENHANCE_SUFFIX.trim()) {
                    let enhanced = format!("{trimmed}{ENHANCE_SUFFIX}");
                    self.prompt.set_text(&enhanced);
                    return vec![Action::StatusLine("prompt enhanced".into())];
                }
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.genre_cursor = (self.genre_cursor + 1) % GENRES.len();
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.genre_cursor = (self.genre_cursor + GENRES.len() - 1) % GENRES.len();
            }
            KeyCode::Enter if !generating => self.toggle_genre(),
            _ => {}
        }
        Vec::new()
    }

    pub fn draw(
        &mut self,
        frame: &mut Frame,
        area: Rect,
        focused: bool,
        library: &Library,
        generating_status: Option<&str>,
    ) {
        let border_style = if focused {
            style_focused_border()
        } else {
            style_unfocused_border()
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(Span::styled(" Create ", Style::default().fg(C_PRIMARY)));
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height < 4 {
            return;
        }

        let mut y = inner.y;
        let row = |y: u16, height: u16| Rect::new(inner.x, y, inner.width, height);

        // Prompt + character count
        self.prompt.draw(frame, row(y, 1), "prompt:");
        y += 1;
        let count = format!("{} / {}", self.prompt.char_count(), PROMPT_MAX_CHARS);
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(count, style_muted()))),
            row(y, 1),
        );
        y += 1;

        // Settings line
        let mut settings = vec![
            Span::styled("model ", style_muted()),
            Span::styled(self.model.label(), Style::default().fg(C_ACCENT)),
        ];
        if let Some(badge) = self.model.badge() {
            settings.push(Span::styled(
                format!(" ({badge})"),
                Style::default().fg(C_BADGE),
            ));
        }
        settings.push(Span::styled("   custom ", style_muted()));
        settings.push(flag_span(self.custom_mode));
        settings.push(Span::styled("   instrumental ", style_muted()));
        settings.push(flag_span(self.instrumental));
        if self.custom_mode {
            settings.push(Span::styled("   vocals ", style_muted()));
            settings.push(Span::styled(
                self.vocal_gender.label(),
                Style::default().fg(C_SECONDARY),
            ));
        }
        frame.render_widget(Paragraph::new(Line::from(settings)), row(y, 1));
        y += 1;

        // Style / title fields (only meaningful in custom mode, always shown
        // so the keys are discoverable)
        if inner.y + inner.height > y {
            self.style.draw(frame, row(y, 1), "style:");
            y += 1;
        }
        if self.custom_mode && inner.y + inner.height > y {
            self.title.draw(frame, row(y, 1), "title:");
            y += 1;
        }
        y += 1; // spacer

        // Genre chips, wrapped to the panel width
        let chip_rows = self.layout_genre_chips(inner.width as usize);
        for spans in chip_rows {
            if y >= inner.y + inner.height {
                break;
            }
            frame.render_widget(Paragraph::new(Line::from(spans)), row(y, 1));
            y += 1;
        }

        // Generation progress
        if let Some(status) = generating_status {
            if y < inner.y + inner.height {
                frame.render_widget(
                    Paragraph::new(Line::from(Span::styled(
                        format!("♪ {status}"),
                        Style::default().fg(C_GENERATING),
                    ))),
                    row(y, 1),
                );
                y += 1;
            }
        }

        // Fresh from the studio
        if !self.recent.is_empty() && y + 1 < inner.y + inner.height {
            y += 1;
            frame.render_widget(
                Paragraph::new(Line::from(Span::styled(
                    "Fresh from the studio",
                    Style::default().fg(C_FRESH).add_modifier(Modifier::BOLD),
                ))),
                row(y, 1),
            );
            y += 1;
            for id in &self.recent {
                if y >= inner.y + inner.height {
                    break;
                }
                if let Some(track) = library.get(id) {
                    let line = Line::from(vec![
                        Span::styled("  ♫ ", Style::default().fg(C_FRESH)),
                        Span::styled(track.display_title().to_string(), style_secondary()),
                    ]);
                    frame.render_widget(Paragraph::new(line), row(y, 1));
                    y += 1;
                }
            }
        }
    }

    /// Wrap the genre chips into rows that fit `width`, styling the selected
    /// chip and the cursor position.
    fn layout_genre_chips(&self, width: usize) -> Vec<Vec<Span<'static>>> {
        let mut rows: Vec<Vec<Span<'static>>> = Vec::new();
        let mut current: Vec<Span<'static>> = Vec::new();
        let mut used = 0usize;

        for (i, genre) in GENRES.iter().enumerate() {
            let label = format!(" {genre} ");
            let w = label.width() + 1;
            if used + w > width && !current.is_empty() {
                rows.push(std::mem::take(&mut current));
                used = 0;
            }

            let selected = self.selected_genre == Some(i);
            let under_cursor = self.genre_cursor == i;
            let mut style = if selected {
                Style::default().fg(C_ACCENT).bg(C_SELECTION_BG)
            } else {
                Style::default().fg(C_SECONDARY)
            };
            if under_cursor {
                style = style.add_modifier(Modifier::UNDERLINED);
            }
            current.push(Span::styled(label, style));
            current.push(Span::styled(" ", Style::default().fg(C_MUTED)));
            used += w;
        }
        if !current.is_empty() {
            rows.push(current);
        }
        rows
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::new()
    }
}

fn flag_span(on: bool) -> Span<'static> {
    if on {
        Span::styled("on", Style::default().fg(C_ACCENT))
    } else {
        Span::styled("off", Style::default().fg(C_MUTED))
    }
}
