//! Track selection from the mood table.

use crate::mood_table::{MoodCell, MoodTable};
use crate::types::{EmotionLabel, WeatherKey};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

/// Strategy for drawing one index out of `len` candidates.
pub trait TrackPicker: Send + Sync {
    /// Return an index in `0..len`. `len` is always at least 1.
    fn pick(&self, len: usize) -> usize;
}

/// Uniform draw from the thread-local RNG.
pub struct RandomPicker;

impl TrackPicker for RandomPicker {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Uniform draw from a seeded RNG, reproducible across runs.
pub struct SeededPicker {
    rng: Mutex<StdRng>,
}

impl SeededPicker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl TrackPicker for SeededPicker {
    fn pick(&self, len: usize) -> usize {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0..len),
            Err(poisoned) => poisoned.into_inner().gen_range(0..len),
        }
    }
}

/// A chosen track plus the cell it came from.
#[derive(Debug, Clone)]
pub struct Selection {
    pub track: String,
    /// Emotion whose sub-table was used (after the `neutral` fallback).
    pub emotion: EmotionLabel,
    /// Weather cell that was used (after the `any` fallback).
    pub weather: WeatherKey,
    pub cell: MoodCell,
}

/// Looks up (emotion, weather) and draws one track from the resolved cell.
pub struct RecommendationSelector {
    table: Arc<MoodTable>,
    picker: Box<dyn TrackPicker>,
}

impl RecommendationSelector {
    pub fn new(table: Arc<MoodTable>, picker: Box<dyn TrackPicker>) -> Self {
        Self { table, picker }
    }

    /// Selector using a real random source.
    pub fn random(table: Arc<MoodTable>) -> Self {
        Self::new(table, Box::new(RandomPicker))
    }

    pub fn table(&self) -> &MoodTable {
        &self.table
    }

    pub fn select(&self, emotion: EmotionLabel, weather: WeatherKey) -> Selection {
        let resolved = self.table.resolve(emotion, weather);
        let tracks = &resolved.cell.tracks;
        let len = tracks.len();
        let mut idx = self.picker.pick(len);
        if idx >= len {
            tracing::warn!(idx, len, "track picker returned an out-of-range index; using the last track");
            idx = len.saturating_sub(1);
        }
        // Validated tables never have empty track lists.
        let track = tracks.get(idx).cloned().unwrap_or_default();

        if resolved.emotion != emotion || resolved.weather != weather {
            tracing::debug!(
                requested = %format!("{emotion}.{weather}"),
                resolved = %format!("{}.{}", resolved.emotion, resolved.weather),
                "mood cell fallback"
            );
        }

        Selection {
            track,
            emotion: resolved.emotion,
            weather: resolved.weather,
            cell: resolved.cell.clone(),
        }
    }
}
