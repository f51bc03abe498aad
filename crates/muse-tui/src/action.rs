//! Action enum — all user-initiated intents and internal events.
//!
//! Components produce Actions; the App dispatches them. Components never
//! mutate shared state directly.

/// Which panel currently has keyboard focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelId {
    Composer,
    Library,
}

impl PanelId {
    pub fn next(self) -> Self {
        match self {
            Self::Composer => Self::Library,
            Self::Library => Self::Composer,
        }
    }
}

/// All actions that can flow through the system.
#[derive(Debug, Clone)]
pub enum Action {
    // ── Generation ───────────────────────────────────────────────────────────
    Generate,
    CancelGeneration,

    // ── Playback ─────────────────────────────────────────────────────────────
    Play(String), // track id, resolved against the live library
    TogglePause,
    Next,
    Prev,
    SeekRelative(f64),
    VolumeDelta(f32),
    ToggleMute,

    // ── Library ──────────────────────────────────────────────────────────────
    DeleteTrack(String),
    FilterChanged(String),
    CopyToClipboard(String),

    // ── Navigation / UI ──────────────────────────────────────────────────────
    FocusNext,
    FocusPane(PanelId),
    StatusLine(String),

    // ── System ───────────────────────────────────────────────────────────────
    Quit,
    Noop,
}
