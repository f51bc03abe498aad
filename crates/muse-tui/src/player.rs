//! Playback controller.
//!
//! Owns the transport state for exactly one active media element across the
//! library's current ordering: selection, play/pause, seeking, volume/mute,
//! and auto-advance when a track ends naturally.
//!
//! The selection is a track *id*, never a Track value: every navigation call
//! re-resolves the id against the live library, so deletions and fresh merges
//! change neighbor relationships without the controller holding stale state.
//! Position and duration are only written from media backend events; the
//! controller never predicts them.

use async_trait::async_trait;
use tracing::{info, warn};

use muse_core::library::Library;
use muse_core::track::Track;

/// What the controller needs from the decode-and-play primitive. Production
/// is mpv over IPC ([`crate::mpv`]); tests use a recording fake.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Load `url` and start playing at the given effective volume (0.0–1.0).
    async fn load(&self, url: &str, volume: f64) -> anyhow::Result<()>;
    async fn set_paused(&self, paused: bool) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
    async fn seek_to(&self, secs: f64) -> anyhow::Result<()>;
    /// Effective output volume (0.0–1.0), after mute is applied.
    async fn set_volume(&self, volume: f64) -> anyhow::Result<()>;
    /// Release the decode-and-play resource for good (app teardown).
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Observations pushed by the media backend.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    Position(Option<f64>),
    Duration(Option<f64>),
    PauseChanged(bool),
    /// The current track played to its natural end.
    Ended,
}

pub struct Player {
    backend: Box<dyn MediaBackend>,
    /// Weak reference into the library: id only, resolved on every use.
    current: Option<String>,
    is_playing: bool,
    position_secs: Option<f64>,
    duration_secs: Option<f64>,
    volume: f32,
    muted: bool,
}

impl Player {
    pub fn new(backend: Box<dyn MediaBackend>, default_volume: f32) -> Self {
        Self {
            backend,
            current: None,
            is_playing: false,
            position_secs: None,
            duration_secs: None,
            volume: default_volume.clamp(0.0, 1.0),
            muted: false,
        }
    }

    // ── Read accessors ────────────────────────────────────────────────────────

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Resolve the selection against the live library.
    pub fn current_track<'a>(&self, library: &'a Library) -> Option<&'a Track> {
        self.current.as_deref().and_then(|id| library.get(id))
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn position_secs(&self) -> Option<f64> {
        self.position_secs
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    /// Output volume after mute: 0 while muted, the stored volume otherwise.
    pub fn effective_volume(&self) -> f64 {
        if self.muted {
            0.0
        } else {
            f64::from(self.volume)
        }
    }

    /// Next/previous are only offered when there is somewhere to go.
    pub fn can_navigate(&self, library: &Library) -> bool {
        library.len() > 1
    }

    // ── Transport ─────────────────────────────────────────────────────────────

    /// Select `track` and start playing it. A start refusal (no playable URL,
    /// backend error) leaves the selection in place with `is_playing` false;
    /// it is not surfaced as an error because an explicit play recovers it.
    pub async fn select(&mut self, track: &Track) {
        self.current = Some(track.id.clone());
        self.position_secs = Some(0.0);
        self.duration_secs = None;
        self.is_playing = false;

        let Some(url) = track.playback_url() else {
            warn!("[player] track {} has no playable url", track.id);
            return;
        };
        match self.backend.load(url, self.effective_volume()).await {
            Ok(()) => {
                info!("[player] playing '{}'", track.display_title());
                self.is_playing = true;
            }
            Err(e) => {
                warn!("[player] failed to start '{}': {}", track.display_title(), e);
            }
        }
    }

    /// Flip play/pause. No-op without a selection.
    pub async fn toggle_play_pause(&mut self) {
        if self.current.is_none() {
            return;
        }
        self.is_playing = !self.is_playing;
        if let Err(e) = self.backend.set_paused(!self.is_playing).await {
            warn!("[player] pause toggle failed: {}", e);
        }
    }

    /// Seek to `fraction` of the track (clamped to [0, 1]). No-op until the
    /// duration has been observed.
    pub async fn seek(&mut self, fraction: f64) {
        let Some(duration) = self.duration_secs else {
            return;
        };
        let secs = fraction.clamp(0.0, 1.0) * duration;
        if let Err(e) = self.backend.seek_to(secs).await {
            warn!("[player] seek failed: {}", e);
        }
    }

    /// Select the entry after the current one in the library's live ordering.
    /// No-op at the end of the collection (no wrap-around).
    pub async fn next(&mut self, library: &Library) {
        let Some(idx) = self.current_index(library) else {
            return;
        };
        if idx + 1 < library.len() {
            let track = library.tracks()[idx + 1].clone();
            self.select(&track).await;
        }
    }

    /// Select the entry before the current one. No-op at the head.
    pub async fn previous(&mut self, library: &Library) {
        let Some(idx) = self.current_index(library) else {
            return;
        };
        if idx > 0 {
            let track = library.tracks()[idx - 1].clone();
            self.select(&track).await;
        }
    }

    /// Set the stored volume. Changing volume while muted is explicit intent
    /// to hear something, so it also unmutes.
    pub async fn set_volume(&mut self, level: f32) {
        self.volume = level.clamp(0.0, 1.0);
        self.muted = false;
        self.apply_volume().await;
    }

    /// Mute/unmute. The stored volume keeps its value either way.
    pub async fn toggle_mute(&mut self) {
        self.muted = !self.muted;
        self.apply_volume().await;
    }

    /// Tear down the media resource on app exit.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.backend.shutdown().await {
            warn!("[player] backend shutdown failed: {}", e);
        }
    }

    /// Stop playback and clear the selection.
    pub async fn stop(&mut self) {
        self.current = None;
        self.is_playing = false;
        self.position_secs = None;
        self.duration_secs = None;
        if let Err(e) = self.backend.stop().await {
            warn!("[player] stop failed: {}", e);
        }
    }

    // ── Events ────────────────────────────────────────────────────────────────

    /// Apply one backend observation. `Ended` auto-advances: playback stops,
    /// then `next()` either continues through the collection or leaves the
    /// controller cleanly stopped on the last track.
    pub async fn on_media_event(&mut self, event: MediaEvent, library: &Library) {
        match event {
            MediaEvent::Position(pos) => self.position_secs = pos,
            MediaEvent::Duration(dur) => self.duration_secs = dur,
            MediaEvent::PauseChanged(paused) => {
                if self.current.is_some() {
                    self.is_playing = !paused;
                }
            }
            MediaEvent::Ended => {
                self.is_playing = false;
                self.next(library).await;
            }
        }
    }

    /// Called after library mutations: when the selected track no longer
    /// exists, playback must stop and the selection clears.
    pub async fn sync_with_library(&mut self, library: &Library) {
        if let Some(id) = self.current.as_deref() {
            if library.index_of(id).is_none() {
                info!("[player] selected track left the library, stopping");
                self.stop().await;
            }
        }
    }

    fn current_index(&self, library: &Library) -> Option<usize> {
        self.current
            .as_deref()
            .and_then(|id| library.index_of(id))
    }

    async fn apply_volume(&mut self) {
        if let Err(e) = self.backend.set_volume(self.effective_volume()).await {
            warn!("[player] volume change failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Load(String, f64),
        SetPaused(bool),
        Stop,
        SeekTo(f64),
        SetVolume(f64),
    }

    #[derive(Default)]
    struct FakeBackend {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_load: bool,
    }

    impl FakeBackend {
        fn recording(calls: Arc<Mutex<Vec<Call>>>) -> Self {
            Self {
                calls,
                fail_load: false,
            }
        }
    }

    #[async_trait]
    impl MediaBackend for FakeBackend {
        async fn load(&self, url: &str, volume: f64) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Load(url.to_string(), volume));
            if self.fail_load {
                anyhow::bail!("autoplay refused");
            }
            Ok(())
        }

        async fn set_paused(&self, paused: bool) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::SetPaused(paused));
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Stop);
            Ok(())
        }

        async fn seek_to(&self, secs: f64) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::SeekTo(secs));
            Ok(())
        }

        async fn set_volume(&self, volume: f64) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::SetVolume(volume));
            Ok(())
        }
    }

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: id.to_uppercase(),
            tags: String::new(),
            prompt: String::new(),
            image_url: None,
            audio_url: Some(format!("https://cdn.example/{id}.mp3")),
            stream_audio_url: None,
            duration: None,
            create_time: None,
        }
    }

    fn library_with(ids: &[&str]) -> (tempfile::TempDir, Library) {
        let dir = tempfile::tempdir().unwrap();
        let mut lib = Library::load(dir.path().join("library.json"));
        lib.merge(ids.iter().map(|id| track(id)).collect()).unwrap();
        (dir, lib)
    }

    fn player() -> (Player, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let backend = FakeBackend::recording(Arc::clone(&calls));
        (Player::new(Box::new(backend), 0.8), calls)
    }

    #[tokio::test]
    async fn test_select_starts_playback_and_resets_position() {
        let (mut player, calls) = player();
        player.select(&track("t1")).await;

        assert_eq!(player.current_id(), Some("t1"));
        assert!(player.is_playing());
        assert_eq!(player.position_secs(), Some(0.0));
        assert_eq!(player.duration_secs(), None);
        assert_eq!(
            calls.lock().unwrap()[0],
            Call::Load("https://cdn.example/t1.mp3".into(), 0.8f32 as f64)
        );
    }

    #[tokio::test]
    async fn test_declined_start_degrades_silently() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let backend = FakeBackend {
            calls: Arc::clone(&calls),
            fail_load: true,
        };
        let mut player = Player::new(Box::new(backend), 0.8);

        player.select(&track("t1")).await;
        assert_eq!(player.current_id(), Some("t1"));
        assert!(!player.is_playing());
    }

    #[tokio::test]
    async fn test_toggle_without_selection_is_noop() {
        let (mut player, calls) = player();
        player.toggle_play_pause().await;
        assert!(!player.is_playing());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_play_pause_flips_and_instructs() {
        let (mut player, calls) = player();
        player.select(&track("t1")).await;

        player.toggle_play_pause().await;
        assert!(!player.is_playing());
        player.toggle_play_pause().await;
        assert!(player.is_playing());

        let calls = calls.lock().unwrap();
        assert_eq!(calls[1], Call::SetPaused(true));
        assert_eq!(calls[2], Call::SetPaused(false));
    }

    #[tokio::test]
    async fn test_navigation_boundaries() {
        let (_dir, lib) = library_with(&["t1", "t2", "t3"]);
        let (mut player, _calls) = player();

        // At the head: previous is a no-op.
        player.select(&track("t1")).await;
        player.previous(&lib).await;
        assert_eq!(player.current_id(), Some("t1"));

        // At the tail: next is a no-op.
        player.select(&track("t3")).await;
        player.next(&lib).await;
        assert_eq!(player.current_id(), Some("t3"));

        // In the middle: both directions work.
        player.select(&track("t2")).await;
        player.next(&lib).await;
        assert_eq!(player.current_id(), Some("t3"));
        player.select(&track("t2")).await;
        player.previous(&lib).await;
        assert_eq!(player.current_id(), Some("t1"));
    }

    #[tokio::test]
    async fn test_navigation_reresolves_live_ordering() {
        let (_dir, mut lib) = library_with(&["t1", "t2", "t3"]);
        let (mut player, _calls) = player();

        player.select(&track("t2")).await;
        // t2 sat at index 1; after removing t1 it is the head, so previous()
        // must become a no-op rather than using the stale index.
        lib.remove("t1").unwrap();
        player.previous(&lib).await;
        assert_eq!(player.current_id(), Some("t2"));
    }

    #[tokio::test]
    async fn test_can_navigate_needs_more_than_one_track() {
        let (_dir, lib_one) = library_with(&["t1"]);
        let (_dir2, lib_two) = library_with(&["t1", "t2"]);
        let (player, _calls) = player();
        assert!(!player.can_navigate(&lib_one));
        assert!(player.can_navigate(&lib_two));
    }

    #[tokio::test]
    async fn test_auto_advance_on_end() {
        let (_dir, lib) = library_with(&["t1", "t2"]);
        let (mut player, _calls) = player();

        player.select(&track("t1")).await;
        player.on_media_event(MediaEvent::Ended, &lib).await;
        assert_eq!(player.current_id(), Some("t2"));
        assert!(player.is_playing());

        // On the last track the controller stops cleanly.
        player.on_media_event(MediaEvent::Ended, &lib).await;
        assert_eq!(player.current_id(), Some("t2"));
        assert!(!player.is_playing());
    }

    #[tokio::test]
    async fn test_seek_requires_known_duration() {
        let (mut player, calls) = player();
        player.select(&track("t1")).await;

        player.seek(0.5).await;
        assert!(!calls.lock().unwrap().contains(&Call::SeekTo(0.0)));

        let (_dir, lib) = library_with(&["t1"]);
        player
            .on_media_event(MediaEvent::Duration(Some(200.0)), &lib)
            .await;
        player.seek(0.5).await;
        player.seek(1.5).await; // clamped to the end
        player.seek(-0.5).await; // clamped to the start

        let calls = calls.lock().unwrap();
        assert!(calls.contains(&Call::SeekTo(100.0)));
        assert!(calls.contains(&Call::SeekTo(200.0)));
        assert!(calls.contains(&Call::SeekTo(0.0)));
    }

    #[tokio::test]
    async fn test_position_is_observed_not_predicted() {
        let (_dir, lib) = library_with(&["t1"]);
        let (mut player, _calls) = player();
        player.select(&track("t1")).await;

        player
            .on_media_event(MediaEvent::Position(Some(42.5)), &lib)
            .await;
        assert_eq!(player.position_secs(), Some(42.5));
        player.on_media_event(MediaEvent::Position(None), &lib).await;
        assert_eq!(player.position_secs(), None);
    }

    #[tokio::test]
    async fn test_set_volume_unmutes() {
        let (mut player, calls) = player();
        player.toggle_mute().await;
        assert!(player.muted());

        player.set_volume(0.5).await;
        assert!(!player.muted());
        assert_eq!(player.volume(), 0.5);

        let calls = calls.lock().unwrap();
        // Mute drove output to 0, set_volume restored audible output.
        assert_eq!(calls[0], Call::SetVolume(0.0));
        assert_eq!(calls[1], Call::SetVolume(0.5f32 as f64));
    }

    #[tokio::test]
    async fn test_mute_keeps_stored_volume() {
        let (mut player, calls) = player();
        player.set_volume(0.5).await;
        player.toggle_mute().await;

        assert!(player.muted());
        assert_eq!(player.volume(), 0.5);
        assert_eq!(player.effective_volume(), 0.0);
        assert_eq!(*calls.lock().unwrap().last().unwrap(), Call::SetVolume(0.0));

        player.toggle_mute().await;
        assert_eq!(player.effective_volume(), 0.5f32 as f64);
    }

    #[tokio::test]
    async fn test_removed_selection_stops_playback() {
        let (_dir, mut lib) = library_with(&["t1", "t2"]);
        let (mut player, calls) = player();

        player.select(&track("t1")).await;
        lib.remove("t1").unwrap();
        player.sync_with_library(&lib).await;

        assert_eq!(player.current_id(), None);
        assert!(!player.is_playing());
        assert!(calls.lock().unwrap().contains(&Call::Stop));

        // With the selection intact nothing happens.
        player.select(&track("t2")).await;
        player.sync_with_library(&lib).await;
        assert_eq!(player.current_id(), Some("t2"));
    }
}
