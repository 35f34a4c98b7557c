use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Axis-aligned face region in pixel coordinates of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    /// True if the box is non-empty and lies entirely inside a `width × height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

/// Dominant facial emotion, ordered to match the classifier's output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Neutral,
    Happiness,
    Surprise,
    Sadness,
    Anger,
    Disgust,
    Fear,
    Contempt,
}

impl EmotionLabel {
    /// All labels in classifier output order.
    pub const ALL: [EmotionLabel; 8] = [
        EmotionLabel::Neutral,
        EmotionLabel::Happiness,
        EmotionLabel::Surprise,
        EmotionLabel::Sadness,
        EmotionLabel::Anger,
        EmotionLabel::Disgust,
        EmotionLabel::Fear,
        EmotionLabel::Contempt,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Happiness => "happiness",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Contempt => "contempt",
        }
    }

    /// Capitalized form for display, e.g. "Sadness".
    pub fn display_name(&self) -> String {
        capitalize(self.as_str())
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|e| e.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownKey(s.to_string()))
    }
}

/// Coarse weather category. `Any` is the universal fallback cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeatherKey {
    Clear,
    PartlyCloudy,
    Cloudy,
    Rain,
    Snow,
    Fog,
    Thunderstorm,
    Any,
}

impl WeatherKey {
    pub const ALL: [WeatherKey; 8] = [
        WeatherKey::Clear,
        WeatherKey::PartlyCloudy,
        WeatherKey::Cloudy,
        WeatherKey::Rain,
        WeatherKey::Snow,
        WeatherKey::Fog,
        WeatherKey::Thunderstorm,
        WeatherKey::Any,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherKey::Clear => "clear",
            WeatherKey::PartlyCloudy => "partly-cloudy",
            WeatherKey::Cloudy => "cloudy",
            WeatherKey::Rain => "rain",
            WeatherKey::Snow => "snow",
            WeatherKey::Fog => "fog",
            WeatherKey::Thunderstorm => "thunderstorm",
            WeatherKey::Any => "any",
        }
    }

    /// Display form with separators replaced by spaces, e.g. "Partly cloudy".
    pub fn display_name(&self) -> String {
        capitalize(&self.as_str().replace('-', " "))
    }
}

impl fmt::Display for WeatherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeatherKey {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|w| w.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownKey(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown key: {0}")]
pub struct UnknownKey(pub String);

/// Geographic position passed to the weather provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// The engine's output for one frame with a detected face.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub emotion: EmotionLabel,
    pub weather: WeatherKey,
    pub track: String,
    pub genre: String,
    pub mechanism: String,
    pub face_box: FaceBox,
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
