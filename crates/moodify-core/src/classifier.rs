//! FER+ emotion classifier via ONNX Runtime.
//!
//! Runs a compact pre-trained CNN over a 48x48 intensity crop and returns
//! the arg-max over eight emotion scores.

use crate::frame;
use crate::types::{EmotionLabel, FaceBox};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
pub const FERPLUS_INPUT_SIZE: usize = 48;
const FERPLUS_PIXEL_SCALE: f32 = 255.0;
const FERPLUS_CLASS_COUNT: usize = 8;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0} (place the FER+ ONNX export in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Maps a face crop to a single emotion label.
///
/// Implementations hold mutable inference state; callers sharing one
/// instance must serialize calls.
pub trait EmotionClassify: Send {
    /// Classify and return the winning score alongside the label.
    fn classify_scored(
        &mut self,
        gray: &GrayImage,
        face: &FaceBox,
    ) -> Result<(EmotionLabel, f32), ClassifierError>;

    fn classify(&mut self, gray: &GrayImage, face: &FaceBox) -> Result<EmotionLabel, ClassifierError> {
        self.classify_scored(gray, face).map(|(label, _)| label)
    }
}

/// FER+-based classifier bound to a fixed set of weights.
pub struct EmotionClassifier {
    session: Session,
}

impl EmotionClassifier {
    /// Load the FER+ ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FER+ model"
        );

        Ok(Self { session })
    }

    /// Crop, resize to 48x48 and scale to [0, 1] as a (1, 48, 48, 1) NHWC tensor.
    pub fn preprocess(gray: &GrayImage, face: &FaceBox) -> Array4<f32> {
        let size = FERPLUS_INPUT_SIZE;
        let crop = frame::crop(gray, face);
        let resized = frame::resize_bilinear(&crop, size as u32, size as u32);

        let mut tensor = Array4::<f32>::zeros((1, size, size, 1));
        for (x, y, pixel) in resized.enumerate_pixels() {
            tensor[[0, y as usize, x as usize, 0]] = pixel.0[0] as f32 / FERPLUS_PIXEL_SCALE;
        }
        tensor
    }
}

impl EmotionClassify for EmotionClassifier {
    fn classify_scored(
        &mut self,
        gray: &GrayImage,
        face: &FaceBox,
    ) -> Result<(EmotionLabel, f32), ClassifierError> {
        let input = Self::preprocess(gray, face);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("emotion scores: {e}")))?;

        if scores.len() != FERPLUS_CLASS_COUNT {
            return Err(ClassifierError::InferenceFailed(format!(
                "expected {FERPLUS_CLASS_COUNT} scores, got {}",
                scores.len()
            )));
        }

        let (idx, score) = argmax(scores)
            .ok_or_else(|| ClassifierError::InferenceFailed("all scores are NaN".into()))?;
        let label = EmotionLabel::from_index(idx)
            .ok_or_else(|| ClassifierError::InferenceFailed(format!("class index {idx} out of range")))?;

        tracing::debug!(%label, score, "emotion classified");
        Ok((label, score))
    }
}

/// Index and value of the maximum score; the first index wins ties.
fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}
