//! moodify-core: mood inference engine.
//!
//! Locates a face with a Haar cascade, classifies its expression with a
//! FER+ model running via ONNX Runtime, resolves local weather through a
//! cached provider and draws a track from the mood × weather table.

pub mod cascade;
pub mod classifier;
pub mod detector;
pub mod engine;
pub mod frame;
pub mod mood_table;
pub mod resolver;
pub mod selector;
pub mod types;
pub mod weather;

pub use classifier::{EmotionClassifier, EmotionClassify};
pub use detector::{CascadeLocator, FaceLocator};
pub use engine::{EngineError, MoodEngine};
pub use mood_table::{MoodCell, MoodTable, TableError};
pub use resolver::{Clock, ProviderError, SystemClock, WeatherCacheEntry, WeatherProvider, WeatherResolver};
pub use selector::{RandomPicker, RecommendationSelector, SeededPicker, TrackPicker};
pub use types::{Coordinates, EmotionLabel, FaceBox, Recommendation, WeatherKey};
pub use weather::classify_weather;
