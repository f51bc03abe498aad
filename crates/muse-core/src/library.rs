//! Persistent track collection.
//!
//! The library owns the durable, deduplicated, newest-first sequence of
//! generated tracks. Every mutating call rewrites the whole library file
//! before it returns, so a read immediately after a write always observes the
//! write. All access goes through this type; nothing else touches the file.

use std::path::PathBuf;

use anyhow::Context;
use tracing::{info, warn};

use crate::track::Track;

pub struct Library {
    tracks: Vec<Track>,
    path: PathBuf,
}

impl Library {
    /// Load the library from `path`. A missing file yields an empty
    /// collection; an unreadable one is logged and treated the same rather
    /// than blocking startup.
    pub fn load(path: PathBuf) -> Self {
        let tracks = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<Track>>(&content) {
                Ok(tracks) => tracks,
                Err(e) => {
                    warn!("[library] failed to parse {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        info!("[library] loaded {} tracks from {}", tracks.len(), path.display());
        Self { tracks, path }
    }

    /// All tracks in stored order (newest first).
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Position of `id` in the current ordering.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    /// Merge `new_tracks` into the collection. Incoming tracks whose id is
    /// already present are dropped (first write wins, the stored entry keeps
    /// its position and fields); the rest are prepended in input order.
    /// Returns how many tracks were actually inserted.
    ///
    /// The merge is atomic with respect to persistence: on a write failure
    /// the in-memory collection is left unchanged and the error propagates.
    pub fn merge(&mut self, new_tracks: Vec<Track>) -> anyhow::Result<usize> {
        let fresh: Vec<Track> = new_tracks
            .into_iter()
            .filter(|t| self.index_of(&t.id).is_none())
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let inserted = fresh.len();
        let mut next = fresh;
        next.extend(self.tracks.iter().cloned());
        self.persist(&next)?;
        self.tracks = next;
        info!("[library] merged {} new tracks ({} total)", inserted, self.tracks.len());
        Ok(inserted)
    }

    /// Remove the track with `id`. Removing an absent id is a no-op, not an
    /// error, and issues no write.
    pub fn remove(&mut self, id: &str) -> anyhow::Result<bool> {
        let Some(idx) = self.index_of(id) else {
            return Ok(false);
        };
        let mut next = self.tracks.clone();
        next.remove(idx);
        self.persist(&next)?;
        self.tracks = next;
        info!("[library] removed track {}", id);
        Ok(true)
    }

    /// Tracks whose title, tags, or prompt contain `text`, case-insensitively,
    /// in stored order. Empty `text` returns the full collection.
    pub fn query(&self, text: &str) -> Vec<&Track> {
        self.tracks.iter().filter(|t| t.matches(text)).collect()
    }

    /// Write the full sequence to the library file. A failed write is a hard
    /// error: silently losing the collection is worse than surfacing it.
    fn persist(&self, tracks: &[Track]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(tracks)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing library file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, title: &str) -> Track {
        Track {
            id: id.to_string(),
            title: title.to_string(),
            tags: String::new(),
            prompt: String::new(),
            image_url: None,
            audio_url: None,
            stream_audio_url: None,
            duration: None,
            create_time: None,
        }
    }

    fn temp_library() -> (tempfile::TempDir, Library) {
        let dir = tempfile::tempdir().unwrap();
        let lib = Library::load(dir.path().join("library.json"));
        (dir, lib)
    }

    fn ids(lib: &Library) -> Vec<&str> {
        lib.tracks().iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (_dir, lib) = temp_library();
        assert!(lib.is_empty());
    }

    #[test]
    fn test_merge_prepends_in_input_order() {
        let (_dir, mut lib) = temp_library();
        lib.merge(vec![track("c", "C"), track("d", "D")]).unwrap();
        lib.merge(vec![track("a", "A"), track("b", "B")]).unwrap();
        assert_eq!(ids(&lib), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_merge_is_idempotent_on_identity() {
        let (_dir, mut lib) = temp_library();
        lib.merge(vec![track("a", "Original"), track("b", "B")]).unwrap();

        // Same id with different fields: dropped, not overwritten or moved.
        let inserted = lib
            .merge(vec![track("a", "Replacement"), track("z", "Z")])
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(ids(&lib), vec!["z", "a", "b"]);
        assert_eq!(lib.get("a").unwrap().title, "Original");
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let (_dir, mut lib) = temp_library();
        lib.merge(vec![track("a", "A")]).unwrap();
        assert!(!lib.remove("nope").unwrap());
        assert!(lib.remove("a").unwrap());
        assert!(lib.is_empty());
    }

    #[test]
    fn test_query_matches_title_tags_prompt() {
        let (_dir, mut lib) = temp_library();
        let mut by_tags = track("a", "Alpha");
        by_tags.tags = "jazz, soul".into();
        let mut by_prompt = track("b", "Beta");
        by_prompt.prompt = "rainy window".into();
        lib.merge(vec![by_tags, by_prompt, track("c", "Gamma")]).unwrap();

        assert_eq!(lib.query("").len(), 3);
        assert_eq!(lib.query("JAZZ").len(), 1);
        assert_eq!(lib.query("rainy").len(), 1);
        assert_eq!(lib.query("gam").len(), 1);
        assert!(lib.query("polka").is_empty());
    }

    #[test]
    fn test_order_survives_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");

        let mut lib = Library::load(path.clone());
        lib.merge(vec![track("c", "C")]).unwrap();
        lib.merge(vec![track("a", "A"), track("b", "B")]).unwrap();

        let reloaded = Library::load(path);
        assert_eq!(ids(&reloaded), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_read_after_write_observes_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");

        let mut lib = Library::load(path.clone());
        lib.merge(vec![track("a", "A")]).unwrap();

        // A second handle opened right after the merge sees the track.
        let other = Library::load(path);
        assert_eq!(other.len(), 1);
    }
}
