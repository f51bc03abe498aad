//! App — single-owner event loop for all mutable state.
//!
//! All mutation of the library, the generation engine, and the playback
//! controller happens here, fed by three channels: terminal input, translated
//! media events from mpv, and progress/terminal events from the generation
//! driver. Components produce `Action`s; the App dispatches them.

use std::io;

use anyhow::Result;
use ratatui::crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::CrosstermBackend;
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use muse_core::library::Library;

use crate::action::{Action, PanelId};
use crate::components::composer::Composer;
use crate::components::player_bar::draw_player_bar;
use crate::components::track_list::TrackList;
use crate::generation::{
    GenerationEngine, GenerationError, GenerationEvent, TaskOutcome, MAX_POLLS,
};
use crate::player::{MediaEvent, Player};
use crate::widgets::status_bar::{draw_status_bar, InputMode};

/// Terminal input forwarded from the blocking reader task.
#[derive(Debug)]
pub enum AppMessage {
    Event(Event),
}

pub struct App {
    library: Library,
    engine: GenerationEngine,
    player: Player,
    composer: Composer,
    track_list: TrackList,
    focus: PanelId,
    status_line: Option<String>,
    error_line: Option<String>,
    generating_status: Option<String>,
    clipboard: Option<arboard::Clipboard>,
    should_quit: bool,
}

impl App {
    pub fn new(library: Library, engine: GenerationEngine, player: Player) -> Self {
        Self {
            library,
            engine,
            player,
            composer: Composer::new(),
            track_list: TrackList::new(),
            focus: PanelId::Composer,
            status_line: None,
            error_line: None,
            generating_status: None,
            clipboard: None,
            should_quit: false,
        }
    }

    // ── Main run loop ─────────────────────────────────────────────────────────

    pub async fn run(
        mut self,
        mut media_rx: mpsc::Receiver<MediaEvent>,
        mut generation_rx: mpsc::Receiver<GenerationEvent>,
    ) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let (tx, mut rx) = mpsc::channel::<AppMessage>(1024);

        // ── Background task: keyboard events ──────────────────────────────────
        let event_tx = tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if event_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        // Light maintenance tick: keeps the status bar and progress fresh even
        // without input.
        let mut ui_tick = tokio::time::interval(std::time::Duration::from_millis(250));
        ui_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("muse started ({} tracks in library)", self.library.len());

        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal.draw(|f| self.draw(f))?;
            }
            needs_redraw = false;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(msg) = rx.recv() => {
                    let AppMessage::Event(ev) = msg;
                    needs_redraw = self.handle_terminal_event(ev).await;
                }

                Some(media_event) = media_rx.recv() => {
                    self.player.on_media_event(media_event, &self.library).await;
                    needs_redraw = true;
                }

                Some(generation_event) = generation_rx.recv() => {
                    self.on_generation_event(generation_event).await;
                    needs_redraw = true;
                }

                _ = ui_tick.tick() => {
                    needs_redraw = true;
                }
            }

            if self.should_quit {
                break;
            }
        }

        // ── Teardown ──────────────────────────────────────────────────────────
        self.engine.cancel();
        self.player.shutdown().await;
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        Ok(())
    }

    fn input_mode(&self) -> InputMode {
        if self.composer.is_editing() {
            InputMode::Edit
        } else if self.track_list.is_filtering() {
            InputMode::Filter
        } else {
            InputMode::Normal
        }
    }

    // ── Event handling ────────────────────────────────────────────────────────

    async fn handle_terminal_event(&mut self, ev: Event) -> bool {
        match ev {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                self.handle_key(key).await;
                true
            }
            Event::Resize(_, _) => true,
            _ => false,
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) {
        // Field editing swallows everything.
        if self.composer.is_editing() {
            let actions = self.composer.handle_edit_key(key);
            self.dispatch_all(actions).await;
            return;
        }
        if self.track_list.is_filtering() {
            let actions = self.track_list.handle_filter_key(key);
            self.dispatch_all(actions).await;
            return;
        }

        use ratatui::crossterm::event::KeyCode;
        let global = match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Tab => Some(Action::FocusNext),
            KeyCode::Char(' ') => Some(Action::TogglePause),
            KeyCode::Char('n') => Some(Action::Next),
            KeyCode::Char('p') => Some(Action::Prev),
            KeyCode::Char(',') => Some(Action::SeekRelative(-10.0)),
            KeyCode::Char('.') => Some(Action::SeekRelative(10.0)),
            KeyCode::Left => Some(Action::VolumeDelta(-0.05)),
            KeyCode::Right => Some(Action::VolumeDelta(0.05)),
            KeyCode::Char('m') => Some(Action::ToggleMute),
            _ => None,
        };
        if let Some(action) = global {
            self.dispatch(action).await;
            return;
        }

        let actions = match self.focus {
            PanelId::Composer => self
                .composer
                .handle_key(key, self.engine.is_active()),
            PanelId::Library => self.track_list.handle_key(key, &self.library),
        };
        self.dispatch_all(actions).await;
    }

    async fn dispatch_all(&mut self, actions: Vec<Action>) {
        for action in actions {
            self.dispatch(action).await;
        }
    }

    async fn dispatch(&mut self, action: Action) {
        match action {
            Action::Generate => self.start_generation(),
            Action::CancelGeneration => {
                if self.engine.is_active() {
                    self.engine.cancel();
                    self.generating_status = None;
                    self.status_line = Some("generation cancelled".into());
                }
            }

            Action::Play(id) => {
                if let Some(track) = self.library.get(&id).cloned() {
                    self.player.select(&track).await;
                }
            }
            Action::TogglePause => self.player.toggle_play_pause().await,
            Action::Next => {
                if self.player.can_navigate(&self.library) {
                    self.player.next(&self.library).await;
                }
            }
            Action::Prev => {
                if self.player.can_navigate(&self.library) {
                    self.player.previous(&self.library).await;
                }
            }
            Action::SeekRelative(delta) => {
                if let (Some(pos), Some(dur)) =
                    (self.player.position_secs(), self.player.duration_secs())
                {
                    if dur > 0.0 {
                        self.player.seek((pos + delta) / dur).await;
                    }
                }
            }
            Action::VolumeDelta(delta) => {
                let level = self.player.volume() + delta;
                self.player.set_volume(level).await;
            }
            Action::ToggleMute => self.player.toggle_mute().await,

            Action::DeleteTrack(id) => match self.library.remove(&id) {
                Ok(true) => {
                    self.status_line = Some("track deleted".into());
                    self.player.sync_with_library(&self.library).await;
                }
                Ok(false) => {}
                Err(e) => {
                    error!("library write failed: {e:#}");
                    self.error_line = Some(format!("failed to save library: {e}"));
                }
            },
            Action::FilterChanged(_) => {}
            Action::CopyToClipboard(text) => self.copy_to_clipboard(&text),

            Action::FocusNext => self.focus = self.focus.next(),
            Action::FocusPane(panel) => self.focus = panel,
            Action::StatusLine(line) => self.status_line = Some(line),

            Action::Quit => self.should_quit = true,
            Action::Noop => {}
        }
    }

    fn start_generation(&mut self) {
        if self.engine.is_active() {
            self.status_line = Some("already generating".into());
            return;
        }
        self.error_line = None;
        match self
            .engine
            .submit(self.composer.prompt_text(), &self.composer.options())
        {
            Ok(()) => {
                self.composer.set_recent(Vec::new());
                self.generating_status = Some("Generating…".into());
            }
            Err(GenerationError::EmptyPrompt) => {
                self.status_line = Some("type a prompt first (e)".into());
            }
            Err(e) => {
                self.error_line = Some(format!("Failed to start generation: {e}"));
            }
        }
    }

    fn copy_to_clipboard(&mut self, text: &str) {
        if self.clipboard.is_none() {
            self.clipboard = arboard::Clipboard::new()
                .map_err(|e| warn!("clipboard unavailable: {}", e))
                .ok();
        }
        match self.clipboard.as_mut().map(|c| c.set_text(text.to_string())) {
            Some(Ok(())) => self.status_line = Some("download url copied".into()),
            _ => self.status_line = Some("clipboard unavailable".into()),
        }
    }

    // ── Generation events ─────────────────────────────────────────────────────

    async fn on_generation_event(&mut self, event: GenerationEvent) {
        match event {
            GenerationEvent::Submitted {
                generation,
                task_id,
            } => {
                if self.engine.accept(generation, false) {
                    info!("task {} accepted by backend", task_id);
                    self.generating_status = Some("Generating…".into());
                }
            }
            GenerationEvent::Polled {
                generation,
                poll_count,
            } => {
                if self.engine.accept(generation, false) {
                    self.generating_status =
                        Some(format!("Generating… poll {poll_count}/{MAX_POLLS}"));
                }
            }
            GenerationEvent::Finished {
                generation,
                outcome,
            } => {
                // A stale terminal event (cancelled or superseded task) must
                // not touch the library or the player.
                if !self.engine.accept(generation, true) {
                    return;
                }
                self.generating_status = None;
                match outcome {
                    TaskOutcome::Succeeded { tracks } => self.finish_success(tracks).await,
                    TaskOutcome::Failed(err) => {
                        self.error_line = Some(match err {
                            GenerationError::TaskFailed => {
                                "Music generation failed. Please try again.".into()
                            }
                            GenerationError::PollTransport(e) => {
                                format!("Status check failed: {e}")
                            }
                            other => format!("Failed to start generation: {other}"),
                        });
                    }
                    TaskOutcome::TimedOut => {
                        self.error_line =
                            Some("Generation timed out. Please try again.".into());
                    }
                }
            }
        }
    }

    async fn finish_success(&mut self, tracks: Vec<muse_core::track::Track>) {
        let first_id = tracks.first().map(|t| t.id.clone());
        let ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();

        match self.library.merge(tracks) {
            Ok(inserted) => {
                self.status_line = Some(format!(
                    "{inserted} new track{} in your library",
                    if inserted == 1 { "" } else { "s" }
                ));
                self.composer.set_recent(ids);
            }
            Err(e) => {
                error!("library write failed: {e:#}");
                self.error_line = Some(format!("failed to save library: {e}"));
                return;
            }
        }

        // Auto-play the first result.
        if let Some(id) = first_id {
            self.track_list.focus_track(&self.library, &id);
            if let Some(track) = self.library.get(&id).cloned() {
                self.player.select(&track).await;
            }
        }
    }

    // ── Render ────────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut Frame) {
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(8),
                Constraint::Length(3),
                Constraint::Length(1),
            ])
            .split(frame.area());

        let panels = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(outer[0]);

        self.composer.draw(
            frame,
            panels[0],
            self.focus == PanelId::Composer,
            &self.library,
            self.generating_status.as_deref(),
        );
        self.track_list.draw(
            frame,
            panels[1],
            self.focus == PanelId::Library,
            &self.library,
            self.player.current_id(),
            self.composer.recent_ids(),
        );

        draw_player_bar(frame, outer[1], &self.player, &self.library);
        draw_status_bar(
            frame,
            outer[2],
            self.input_mode(),
            self.focus,
            self.generating_status.as_deref(),
            self.error_line.as_deref(),
            self.status_line.as_deref(),
        );
    }
}
