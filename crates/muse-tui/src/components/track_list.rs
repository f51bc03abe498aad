//! TrackList component — the library panel.
//!
//! Search-as-you-type over title/tags/prompt, play on Enter, delete, and
//! copy-download-URL. All rows come from a fresh `Library::query` per draw,
//! so merges and deletions show up immediately.

use ratatui::crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use muse_core::library::Library;
use muse_core::track::Track;

use crate::action::Action;
use crate::theme::{
    style_focused_border, style_muted, style_selected, style_selected_focused,
    style_unfocused_border, C_FRESH, C_MUTED, C_PLAYING, C_PRIMARY, C_SECONDARY, C_TAG,
};
use crate::widgets::progress_bar::fmt_time;
use crate::widgets::text_field::{FieldAction, TextField};

pub struct TrackList {
    filter: TextField,
    selected: usize,
    list_state: ListState,
}

impl TrackList {
    pub fn new() -> Self {
        Self {
            filter: TextField::new("search tracks..."),
            selected: 0,
            list_state: ListState::default(),
        }
    }

    pub fn is_filtering(&self) -> bool {
        self.filter.is_editing()
    }

    pub fn filter_text(&self) -> &str {
        self.filter.text()
    }

    fn visible<'a>(&self, library: &'a Library) -> Vec<&'a Track> {
        library.query(self.filter.text())
    }

    fn clamp_selection(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    /// The track under the cursor, in the current filtered view.
    pub fn selected_track<'a>(&self, library: &'a Library) -> Option<&'a Track> {
        let visible = self.visible(library);
        visible.get(self.selected).copied()
    }

    /// Move the cursor to `id` if it is visible (used after merges so the
    /// fresh track is under the cursor).
    pub fn focus_track(&mut self, library: &Library, id: &str) {
        if let Some(idx) = self.visible(library).iter().position(|t| t.id == id) {
            self.selected = idx;
        }
    }

    pub fn handle_filter_key(&mut self, key: KeyEvent) -> Vec<Action> {
        match self.filter.handle_key(key) {
            FieldAction::Changed(text) => vec![Action::FilterChanged(text)],
            FieldAction::Cancelled => vec![Action::FilterChanged(String::new())],
            FieldAction::Confirmed => Vec::new(),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, library: &Library) -> Vec<Action> {
        let len = self.visible(library).len();
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                if len > 0 {
                    self.selected = (self.selected + 1).min(len - 1);
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Char('g') | KeyCode::Home => self.selected = 0,
            KeyCode::Char('G') | KeyCode::End => {
                if len > 0 {
                    self.selected = len - 1;
                }
            }
            KeyCode::Enter => {
                if let Some(track) = self.selected_track(library) {
                    return vec![Action::Play(track.id.clone())];
                }
            }
            KeyCode::Char('d') => {
                if let Some(track) = self.selected_track(library) {
                    return vec![Action::DeleteTrack(track.id.clone())];
                }
            }
            KeyCode::Char('y') => {
                if let Some(url) = self
                    .selected_track(library)
                    .and_then(|t| t.audio_url.clone())
                {
                    return vec![Action::CopyToClipboard(url)];
                }
                return vec![Action::StatusLine("no download url for this track".into())];
            }
            KeyCode::Char('/') => self.filter.begin_edit(),
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
        playing_id: Option<&str>,
        fresh_ids: &[String],
    ) {
        let border_style = if focused {
            style_focused_border()
        } else {
            style_unfocused_border()
        };
        let title = format!(
            " Library — {} track{} ",
            library.len(),
            if library.len() == 1 { "" } else { "s" }
        );
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(Span::styled(title, Style::default().fg(C_PRIMARY)));
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height == 0 {
            return;
        }

        let mut list_area = inner;
        if self.filter.is_editing() || !self.filter.text().is_empty() {
            let filter_area = Rect::new(inner.x, inner.y, inner.width, 1);
            self.filter.draw(frame, filter_area, "/");
            list_area = Rect::new(inner.x, inner.y + 1, inner.width, inner.height - 1);
        }

        let visible = self.visible(library);
        self.clamp_selection(visible.len());

        if visible.is_empty() {
            let (headline, hint) = if library.is_empty() {
                ("Nothing here yet", "Create your first track and it will appear here")
            } else {
                ("No matches", "Try a different search term")
            };
            let lines = vec![
                Line::from(Span::styled(
                    headline,
                    Style::default().fg(C_SECONDARY).add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(hint, style_muted())),
            ];
            frame.render_widget(Paragraph::new(lines), list_area);
            return;
        }

        let width = list_area.width as usize;
        let items: Vec<ListItem> = visible
            .iter()
            .enumerate()
            .map(|(i, track)| {
                let playing = playing_id == Some(track.id.as_str());
                let fresh = fresh_ids.iter().any(|id| id == &track.id);

                let marker = if playing { "▶ " } else { "  " };
                let duration = track
                    .duration
                    .map(fmt_time)
                    .unwrap_or_else(|| "-:--".to_string());

                let title = track.display_title();
                let subtitle = track.display_subtitle();
                let head_w = marker.width() + title.width();
                let tail_w = duration.len() + 1;
                let sub_budget = width.saturating_sub(head_w + tail_w + 3);
                let subtitle: String = subtitle.chars().take(sub_budget).collect();

                let mut spans = vec![
                    Span::styled(
                        marker.to_string(),
                        Style::default().fg(C_PLAYING),
                    ),
                    Span::styled(
                        title.to_string(),
                        if playing {
                            Style::default().fg(C_PLAYING)
                        } else {
                            Style::default().fg(C_PRIMARY)
                        },
                    ),
                ];
                if fresh {
                    spans.push(Span::styled(" ●", Style::default().fg(C_FRESH)));
                }
                if !subtitle.is_empty() {
                    spans.push(Span::styled(
                        format!("  {subtitle}"),
                        Style::default().fg(C_TAG),
                    ));
                }
                spans.push(Span::styled(
                    format!("  {duration}"),
                    Style::default().fg(C_MUTED),
                ));

                let mut item = ListItem::new(Line::from(spans));
                if i == self.selected {
                    item = item.style(if focused {
                        style_selected_focused()
                    } else {
                        style_selected()
                    });
                }
                item
            })
            .collect();

        self.list_state.select(Some(self.selected));
        frame.render_stateful_widget(List::new(items), list_area, &mut self.list_state);
    }
}

impl Default for TrackList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn track(id: &str, title: &str) -> Track {
        Track {
            id: id.to_string(),
            title: title.to_string(),
            tags: String::new(),
            prompt: String::new(),
            image_url: None,
            audio_url: Some(format!("https://cdn.example/{id}.mp3")),
            stream_audio_url: None,
            duration: None,
            create_time: None,
        }
    }

    fn library_with(entries: &[(&str, &str)]) -> (tempfile::TempDir, Library) {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = Library::load(dir.path().join("library.json"));
        lib.merge(entries.iter().map(|(id, t)| track(id, t)).collect())
            .unwrap();
        (dir, lib)
    }

    #[test]
    fn test_enter_plays_selected() {
        let (_dir, lib) = library_with(&[("a", "Alpha"), ("b", "Beta")]);
        let mut list = TrackList::new();
        list.handle_key(key(KeyCode::Char('j')), &lib);
        let actions = list.handle_key(key(KeyCode::Enter), &lib);
        assert!(matches!(&actions[0], Action::Play(id) if id == "b"));
    }

    #[test]
    fn test_selection_stays_in_bounds() {
        let (_dir, lib) = library_with(&[("a", "Alpha")]);
        let mut list = TrackList::new();
        list.handle_key(key(KeyCode::Char('j')), &lib);
        list.handle_key(key(KeyCode::Char('j')), &lib);
        assert_eq!(list.selected_track(&lib).unwrap().id, "a");
        list.handle_key(key(KeyCode::Char('k')), &lib);
        assert_eq!(list.selected_track(&lib).unwrap().id, "a");
    }

    #[test]
    fn test_filter_narrows_view() {
        let (_dir, lib) = library_with(&[("a", "Alpha"), ("b", "Beta")]);
        let mut list = TrackList::new();
        list.filter.set_text("bet");
        assert_eq!(list.selected_track(&lib).unwrap().id, "b");
    }

    #[test]
    fn test_copy_without_url_reports() {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = Library::load(dir.path().join("library.json"));
        let mut bare = track("a", "Alpha");
        bare.audio_url = None;
        lib.merge(vec![bare]).unwrap();

        let mut list = TrackList::new();
        let actions = list.handle_key(key(KeyCode::Char('y')), &lib);
        assert!(matches!(&actions[0], Action::StatusLine(_)));
    }

    #[test]
    fn test_focus_track_moves_cursor() {
        let (_dir, lib) = library_with(&[("a", "Alpha"), ("b", "Beta"), ("c", "Gamma")]);
        let mut list = TrackList::new();
        list.focus_track(&lib, "c");
        assert_eq!(list.selected_track(&lib).unwrap().id, "c");
    }
}
