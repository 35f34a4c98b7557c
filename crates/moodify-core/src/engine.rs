//! Mood inference engine: frame in, recommendation out.
//!
//! Owns the loaded classifier and the weather cache for the life of the
//! process. Construct once at startup and share by reference (or `Arc`)
//! across request handlers.

use crate::cascade::CascadeError;
use crate::classifier::{ClassifierError, EmotionClassifier, EmotionClassify};
use crate::detector::{CascadeLocator, FaceLocator};
use crate::frame;
use crate::resolver::{WeatherCacheEntry, WeatherResolver};
use crate::selector::RecommendationSelector;
use crate::types::{Coordinates, Recommendation, WeatherKey};
use image::RgbImage;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("cascade error: {0}")]
    Cascade(#[from] CascadeError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
}

pub struct MoodEngine {
    locator: Box<dyn FaceLocator + Send + Sync>,
    /// Inference state is single-use; one classification at a time.
    classifier: Mutex<Box<dyn EmotionClassify>>,
    weather: WeatherResolver,
    selector: RecommendationSelector,
}

impl MoodEngine {
    pub fn new(
        locator: Box<dyn FaceLocator + Send + Sync>,
        classifier: Box<dyn EmotionClassify>,
        weather: WeatherResolver,
        selector: RecommendationSelector,
    ) -> Self {
        Self {
            locator,
            classifier: Mutex::new(classifier),
            weather,
            selector,
        }
    }

    /// Load the cascade and classifier weights from disk. Fails fast if
    /// either file is missing or unreadable.
    pub fn load(
        cascade_path: &Path,
        model_path: &Path,
        weather: WeatherResolver,
        selector: RecommendationSelector,
    ) -> Result<Self, EngineError> {
        let locator = CascadeLocator::load(cascade_path)?;
        tracing::info!(path = %cascade_path.display(), "face locator loaded");

        let classifier = EmotionClassifier::load(model_path)?;
        tracing::info!(path = %model_path.display(), "emotion classifier loaded");

        tracing::info!(
            table_version = selector.table().version(),
            weather_ttl_secs = weather.ttl().num_seconds(),
            "mood engine ready"
        );

        Ok(Self::new(Box::new(locator), Box::new(classifier), weather, selector))
    }

    /// Run the full pipeline on one frame.
    ///
    /// Returns `Ok(None)` when no face is found; neither the classifier
    /// nor the weather provider is consulted in that case.
    pub fn infer(&self, frame: &RgbImage, at: Coordinates) -> Result<Option<Recommendation>, EngineError> {
        let gray = frame::to_intensity(frame);

        let Some(face_box) = self.locator.locate(&gray) else {
            tracing::debug!(width = frame.width(), height = frame.height(), "no face detected");
            return Ok(None);
        };

        let (emotion, score) = self.lock_classifier().classify_scored(&gray, &face_box)?;
        let weather = self.weather.resolve(at);
        let selection = self.selector.select(emotion, weather);

        tracing::info!(
            %emotion,
            score,
            %weather,
            track = %selection.track,
            cell = %format!("{}.{}", selection.emotion, selection.weather),
            "recommendation"
        );

        Ok(Some(Recommendation {
            emotion,
            weather,
            track: selection.track,
            genre: selection.cell.genre,
            mechanism: selection.cell.mechanism,
            face_box,
        }))
    }

    /// Resolve the current weather key directly, for diagnostics.
    pub fn resolve_weather(&self, at: Coordinates) -> WeatherKey {
        self.weather.resolve(at)
    }

    pub fn cached_weather(&self) -> Option<WeatherCacheEntry> {
        self.weather.cached()
    }

    fn lock_classifier(&self) -> MutexGuard<'_, Box<dyn EmotionClassify>> {
        self.classifier.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
