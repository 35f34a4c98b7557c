use moodify_core::{FaceBox, Recommendation};
use serde::Serialize;

pub const NO_FACE_MESSAGE: &str = "No face detected";

#[derive(Debug, Serialize, PartialEq)]
pub struct BoxReport {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl From<FaceBox> for BoxReport {
    fn from(b: FaceBox) -> Self {
        Self {
            x: b.x,
            y: b.y,
            w: b.width,
            h: b.height,
        }
    }
}

/// One line of `moodify analyze` output.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum AnalysisReport {
    Match {
        emotion: String,
        weather: String,
        song: String,
        spotify_url: String,
        genre: String,
        mechanism: String,
        #[serde(rename = "box")]
        face_box: BoxReport,
    },
    Error {
        error: String,
    },
}

impl AnalysisReport {
    pub fn matched(rec: Recommendation, spotify_url: String) -> Self {
        Self::Match {
            emotion: rec.emotion.display_name(),
            weather: rec.weather.display_name(),
            song: rec.track,
            spotify_url,
            genre: rec.genre,
            mechanism: rec.mechanism,
            face_box: rec.face_box.into(),
        }
    }

    pub fn no_face() -> Self {
        Self::Error {
            error: NO_FACE_MESSAGE.to_string(),
        }
    }

    pub fn failed(err: &anyhow::Error) -> Self {
        Self::Error {
            error: format!("{err:#}"),
        }
    }
}
