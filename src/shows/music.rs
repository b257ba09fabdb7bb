//! Music recommendation source

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{normalize_label, MusicTrack};

/// Read-only track lookup by genre
#[async_trait]
pub trait MusicSource: Send + Sync {
    /// Up to `count` tracks matching any of `genres`; any genre when empty
    async fn recommend(&self, genres: &[String], count: usize) -> Result<Vec<MusicTrack>>;
}

/// Fixed in-process catalog
#[derive(Debug, Clone)]
pub struct StaticMusicCatalog {
    tracks: Vec<MusicTrack>,
}

fn track(id: &str, title: &str, artist: &str, duration_secs: u32, genre: &str) -> MusicTrack {
    MusicTrack {
        id: id.to_string(),
        title: title.to_string(),
        artist: artist.to_string(),
        duration_secs,
        genre: genre.to_string(),
    }
}

impl Default for StaticMusicCatalog {
    fn default() -> Self {
        Self::new(vec![
            track("lofi-001", "Morning Static", "Paper Lanterns", 174, "lofi"),
            track("lofi-002", "Window Seat", "Paper Lanterns", 188, "lofi"),
            track("lofi-003", "Tea at Noon", "Slow Orbit", 162, "lofi"),
            track("jazz-001", "Blue Corridor", "Marlowe Trio", 241, "jazz"),
            track("jazz-002", "Late Ferry", "Marlowe Trio", 205, "jazz"),
            track("jazz-003", "Quiet Harbor", "Ines Quartet", 226, "jazz"),
            track("indie-001", "Salt & Light", "The Shoals", 199, "indie"),
            track("indie-002", "Paper Boats", "The Shoals", 183, "indie"),
            track("ambient-001", "Low Tide", "Field Notes", 312, "ambient"),
            track("ambient-002", "Fog Bank", "Field Notes", 290, "ambient"),
            track("classical-001", "Prelude in Grey", "North Quartet", 258, "classical"),
            track("electronic-001", "Night Bus", "Circuit Garden", 214, "electronic"),
        ])
    }
}

impl StaticMusicCatalog {
    pub fn new(tracks: Vec<MusicTrack>) -> Self {
        Self { tracks }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[async_trait]
impl MusicSource for StaticMusicCatalog {
    async fn recommend(&self, genres: &[String], count: usize) -> Result<Vec<MusicTrack>> {
        let wanted: Vec<String> = genres.iter().map(|g| normalize_label(g)).collect();
        let matching = self
            .tracks
            .iter()
            .filter(|t| wanted.is_empty() || wanted.contains(&normalize_label(&t.genre)));

        let mut picked: Vec<MusicTrack> = matching.take(count).cloned().collect();
        // Top up from other genres so a show always gets its track count
        if picked.len() < count {
            let extra: Vec<MusicTrack> = self
                .tracks
                .iter()
                .filter(|t| !picked.iter().any(|p| p.id == t.id))
                .take(count - picked.len())
                .cloned()
                .collect();
            picked.extend(extra);
        }
        Ok(picked)
    }
}
