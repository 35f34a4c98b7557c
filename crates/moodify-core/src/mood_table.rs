//! Mood × weather recommendation table.
//!
//! The table is static configuration. The default copy is embedded at
//! compile time from `contrib/mood_table.toml`; deployments may load
//! their own file. Every table is validated on load so that lookups
//! cannot fail afterwards.

use crate::types::{EmotionLabel, WeatherKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

const BUILTIN_TABLE: &str = include_str!("../../../contrib/mood_table.toml");

#[derive(Error, Debug)]
pub enum TableError {
    #[error("mood table not found: {0}")]
    NotFound(String),
    #[error("failed to read mood table {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("mood table TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown emotion {0:?} in mood table")]
    UnknownEmotion(String),
    #[error("unknown weather {weather:?} under emotion {emotion}")]
    UnknownWeather { emotion: EmotionLabel, weather: String },
    #[error("mood table has no neutral entry")]
    MissingNeutral,
    #[error("emotion {0} has no `any` cell")]
    MissingAny(EmotionLabel),
    #[error("cell {emotion}.{weather} has no tracks")]
    EmptyTracks { emotion: EmotionLabel, weather: WeatherKey },
}

/// One (emotion, weather) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoodCell {
    pub genre: String,
    pub acoustic_strategy: String,
    pub mechanism: String,
    pub tracks: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTable {
    version: u32,
    moods: BTreeMap<String, BTreeMap<String, MoodCell>>,
}

/// Cells for one emotion. The `any` cell is held apart so it always exists.
#[derive(Debug, Clone)]
struct EmotionCells {
    by_weather: BTreeMap<WeatherKey, MoodCell>,
    any: MoodCell,
}

impl EmotionCells {
    fn resolve(&self, weather: WeatherKey) -> (WeatherKey, &MoodCell) {
        match self.by_weather.get(&weather) {
            Some(cell) => (weather, cell),
            None => (WeatherKey::Any, &self.any),
        }
    }

    fn len(&self) -> usize {
        self.by_weather.len() + 1
    }
}

/// The cell a lookup landed on, with the keys actually used.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedCell<'a> {
    pub emotion: EmotionLabel,
    pub weather: WeatherKey,
    pub cell: &'a MoodCell,
}

/// Validated mood table.
#[derive(Debug, Clone)]
pub struct MoodTable {
    version: u32,
    neutral: EmotionCells,
    others: BTreeMap<EmotionLabel, EmotionCells>,
}

impl MoodTable {
    /// The table shipped with the crate.
    pub fn builtin() -> Result<Self, TableError> {
        Self::from_toml(BUILTIN_TABLE)
    }

    /// Load and validate a table file.
    pub fn load(path: &Path) -> Result<Self, TableError> {
        if !path.exists() {
            return Err(TableError::NotFound(path.display().to_string()));
        }
        let src = std::fs::read_to_string(path).map_err(|source| TableError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_toml(&src)?;
        tracing::info!(
            path = %path.display(),
            version = table.version,
            emotions = table.emotions().count(),
            "loaded mood table"
        );
        Ok(table)
    }

    pub fn from_toml(src: &str) -> Result<Self, TableError> {
        let raw: RawTable = toml::from_str(src)?;

        let mut neutral = None;
        let mut others = BTreeMap::new();

        for (emotion_name, cells) in raw.moods {
            let emotion: EmotionLabel = emotion_name
                .parse()
                .map_err(|_| TableError::UnknownEmotion(emotion_name.clone()))?;

            let mut by_weather = BTreeMap::new();
            let mut any = None;
            for (weather_name, cell) in cells {
                let weather: WeatherKey = weather_name.parse().map_err(|_| TableError::UnknownWeather {
                    emotion,
                    weather: weather_name.clone(),
                })?;
                if cell.tracks.is_empty() {
                    return Err(TableError::EmptyTracks { emotion, weather });
                }
                if weather == WeatherKey::Any {
                    any = Some(cell);
                } else {
                    by_weather.insert(weather, cell);
                }
            }

            let any = any.ok_or(TableError::MissingAny(emotion))?;
            let entry = EmotionCells { by_weather, any };
            if emotion == EmotionLabel::Neutral {
                neutral = Some(entry);
            } else {
                others.insert(emotion, entry);
            }
        }

        Ok(Self {
            version: raw.version,
            neutral: neutral.ok_or(TableError::MissingNeutral)?,
            others,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Emotions present in the table, `neutral` first.
    pub fn emotions(&self) -> impl Iterator<Item = EmotionLabel> + '_ {
        std::iter::once(EmotionLabel::Neutral).chain(self.others.keys().copied())
    }

    /// Number of cells defined for `emotion` (including `any`), or 0 if absent.
    pub fn cell_count(&self, emotion: EmotionLabel) -> usize {
        self.entry(emotion).map_or(0, EmotionCells::len)
    }

    /// Exact lookup without fallback.
    pub fn cell(&self, emotion: EmotionLabel, weather: WeatherKey) -> Option<&MoodCell> {
        let cells = self.entry(emotion)?;
        if weather == WeatherKey::Any {
            Some(&cells.any)
        } else {
            cells.by_weather.get(&weather)
        }
    }

    /// Two-level lookup: unknown emotion → `neutral`, then unknown weather → `any`.
    pub fn resolve(&self, emotion: EmotionLabel, weather: WeatherKey) -> ResolvedCell<'_> {
        let (emotion, cells) = match self.entry(emotion) {
            Some(cells) => (emotion, cells),
            None => (EmotionLabel::Neutral, &self.neutral),
        };
        let (weather, cell) = cells.resolve(weather);
        ResolvedCell { emotion, weather, cell }
    }

    fn entry(&self, emotion: EmotionLabel) -> Option<&EmotionCells> {
        if emotion == EmotionLabel::Neutral {
            Some(&self.neutral)
        } else {
            self.others.get(&emotion)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SMALL_TABLE: &str = r#"
version = 3

[moods.neutral.any]
genre = "Lo-fi"
acoustic_strategy = "low energy"
mechanism = "baseline"
tracks = ["Calm"]

[moods.neutral.rain]
genre = "Acoustic"
acoustic_strategy = "mid-range"
mechanism = "blends with rain"
tracks = ["Drops", "Puddles"]

[moods.anger.any]
genre = "Phonk"
acoustic_strategy = "distortion"
mechanism = "discharge"
tracks = ["Fatality"]
"#;

    #[test]
    fn test_builtin_table_is_valid() {
        let table = MoodTable::builtin().unwrap();
        assert_eq!(table.version(), 1);
        for emotion in EmotionLabel::ALL {
            assert!(table.cell(emotion, WeatherKey::Any).is_some(), "{emotion} lacks any");
        }
        let sad_rain = table.cell(EmotionLabel::Sadness, WeatherKey::Rain).unwrap();
        assert_eq!(sad_rain.genre, "Marathi Sad / Nostalgic Folk");
    }

    #[test]
    fn test_resolve_exact_cell() {
        let table = MoodTable::from_toml(SMALL_TABLE).unwrap();
        let resolved = table.resolve(EmotionLabel::Neutral, WeatherKey::Rain);
        assert_eq!(resolved.emotion, EmotionLabel::Neutral);
        assert_eq!(resolved.weather, WeatherKey::Rain);
        assert_eq!(resolved.cell.tracks, vec!["Drops", "Puddles"]);
    }

    #[test]
    fn test_resolve_unknown_weather_falls_back_to_any() {
        let table = MoodTable::from_toml(SMALL_TABLE).unwrap();
        let resolved = table.resolve(EmotionLabel::Anger, WeatherKey::Rain);
        assert_eq!(resolved.emotion, EmotionLabel::Anger);
        assert_eq!(resolved.weather, WeatherKey::Any);
        assert_eq!(resolved.cell.genre, "Phonk");
    }

    #[test]
    fn test_resolve_unknown_emotion_falls_back_to_neutral() {
        let table = MoodTable::from_toml(SMALL_TABLE).unwrap();
        // Fallbacks are independent: the neutral rain cell exists, so it is used.
        let resolved = table.resolve(EmotionLabel::Contempt, WeatherKey::Rain);
        assert_eq!(resolved.emotion, EmotionLabel::Neutral);
        assert_eq!(resolved.weather, WeatherKey::Rain);

        let resolved = table.resolve(EmotionLabel::Fear, WeatherKey::Snow);
        assert_eq!(resolved.emotion, EmotionLabel::Neutral);
        assert_eq!(resolved.weather, WeatherKey::Any);
        assert_eq!(resolved.cell.tracks, vec!["Calm"]);
    }

    #[test]
    fn test_rejects_missing_any() {
        let src = SMALL_TABLE.replace("[moods.anger.any]", "[moods.anger.clear]");
        assert!(matches!(
            MoodTable::from_toml(&src),
            Err(TableError::MissingAny(EmotionLabel::Anger))
        ));
    }

    #[test]
    fn test_rejects_missing_neutral() {
        let src = SMALL_TABLE.replace("moods.neutral.", "moods.happiness.");
        assert!(matches!(MoodTable::from_toml(&src), Err(TableError::MissingNeutral)));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let src = SMALL_TABLE.replace("[moods.anger.any]", "[moods.rage.any]");
        assert!(matches!(MoodTable::from_toml(&src), Err(TableError::UnknownEmotion(_))));

        let src = SMALL_TABLE.replace("[moods.neutral.rain]", "[moods.neutral.drizzle]");
        assert!(matches!(MoodTable::from_toml(&src), Err(TableError::UnknownWeather { .. })));
    }

    #[test]
    fn test_rejects_empty_tracks() {
        let src = SMALL_TABLE.replace(r#"tracks = ["Fatality"]"#, "tracks = []");
        assert!(matches!(MoodTable::from_toml(&src), Err(TableError::EmptyTracks { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SMALL_TABLE.as_bytes()).unwrap();
        let table = MoodTable::load(file.path()).unwrap();
        assert_eq!(table.version(), 3);
        assert_eq!(table.cell_count(EmotionLabel::Neutral), 2);
        assert_eq!(table.cell_count(EmotionLabel::Anger), 1);
        assert_eq!(table.cell_count(EmotionLabel::Fear), 0);
        assert_eq!(
            table.emotions().collect::<Vec<_>>(),
            vec![EmotionLabel::Neutral, EmotionLabel::Anger]
        );
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            MoodTable::load(Path::new("/nonexistent/moods.toml")),
            Err(TableError::NotFound(_))
        ));
    }
}
