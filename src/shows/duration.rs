//! Show duration estimate

use crate::utils::word_count;

/// Speaking rate used for script timing
pub const WORDS_PER_MINUTE: f64 = 150.0;

/// Nominal length of one music track
pub const SECONDS_PER_TRACK: f64 = 180.0;

/// `round(words / 150 * 60 + tracks * 180)` seconds
pub fn estimate_duration_secs(words: usize, music_tracks: usize) -> u32 {
    let speech = words as f64 / WORDS_PER_MINUTE * 60.0;
    let music = music_tracks as f64 * SECONDS_PER_TRACK;
    (speech + music).round() as u32
}

pub fn script_duration_secs(script: &str, music_tracks: usize) -> u32 {
    estimate_duration_secs(word_count(script), music_tracks)
}
