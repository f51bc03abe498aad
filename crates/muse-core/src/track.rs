//! Track model — one generated audio artifact.
//!
//! Tracks are created by the generation backend and never mutated afterwards.
//! The same camelCase JSON shape is used on the wire (status responses) and in
//! the persisted library file, so a round trip through either is lossless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One generated track. `id` is the identity used for deduplication; everything
/// else is descriptive payload from the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Free-text genre/style descriptors, comma-separated by the backend.
    #[serde(default)]
    pub tags: String,
    /// The prompt this track was generated from.
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Permanent, downloadable audio URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Playback-optimized variant, preferred for streaming when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_audio_url: Option<String>,
    /// Duration in seconds; absent until the backend has measured it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Backend creation timestamp. When the backend omits it the orchestrator
    /// stamps capture time instead (best-effort, not authoritative).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
}

impl Track {
    /// Display title for list rows and the player bar.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "Untitled"
        } else {
            &self.title
        }
    }

    /// Secondary display line: tags when present, otherwise the prompt head.
    pub fn display_subtitle(&self) -> String {
        if !self.tags.is_empty() {
            return self.tags.clone();
        }
        let mut head: String = self.prompt.chars().take(50).collect();
        if self.prompt.chars().count() > 50 {
            head.push('…');
        }
        head
    }

    /// URL to hand to the media backend: stream variant first, download URL
    /// as fallback.
    pub fn playback_url(&self) -> Option<&str> {
        self.stream_audio_url
            .as_deref()
            .or(self.audio_url.as_deref())
    }

    /// Case-insensitive containment over title, tags, and prompt.
    /// An empty needle matches everything.
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        let needle = needle.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self.tags.to_lowercase().contains(&needle)
            || self.prompt.to_lowercase().contains(&needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: "Night Drive".into(),
            tags: "synthwave, retro".into(),
            prompt: "a neon city at 2am".into(),
            image_url: None,
            audio_url: Some("https://cdn.example/a.mp3".into()),
            stream_audio_url: None,
            duration: Some(183.2),
            create_time: None,
        }
    }

    #[test]
    fn test_wire_shape_round_trip() {
        let json = r#"{
            "id": "trk_1",
            "title": "Night Drive",
            "tags": "synthwave",
            "prompt": "a neon city",
            "audioUrl": "https://cdn.example/a.mp3",
            "streamAudioUrl": "https://cdn.example/a-stream.mp3",
            "duration": 183.2,
            "createTime": "2025-11-03T10:15:00Z"
        }"#;
        let t: Track = serde_json::from_str(json).unwrap();
        assert_eq!(t.id, "trk_1");
        assert_eq!(t.playback_url(), Some("https://cdn.example/a-stream.mp3"));
        assert!(t.create_time.is_some());

        let back = serde_json::to_value(&t).unwrap();
        assert_eq!(back["audioUrl"], "https://cdn.example/a.mp3");
        assert_eq!(back["streamAudioUrl"], "https://cdn.example/a-stream.mp3");
        // camelCase on the way out, absent fields skipped
        assert!(back.get("imageUrl").is_none());
    }

    #[test]
    fn test_missing_optionals_parse() {
        let t: Track = serde_json::from_str(r#"{"id": "trk_2"}"#).unwrap();
        assert_eq!(t.display_title(), "Untitled");
        assert!(t.playback_url().is_none());
        assert!(t.create_time.is_none());
    }

    #[test]
    fn test_playback_url_prefers_stream() {
        let mut t = track("trk_3");
        assert_eq!(t.playback_url(), Some("https://cdn.example/a.mp3"));
        t.stream_audio_url = Some("https://cdn.example/s.mp3".into());
        assert_eq!(t.playback_url(), Some("https://cdn.example/s.mp3"));
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let t = track("trk_4");
        assert!(t.matches(""));
        assert!(t.matches("NIGHT"));
        assert!(t.matches("retro"));
        assert!(t.matches("neon CITY"));
        assert!(!t.matches("polka"));
    }
}
