use moodify_core::resolver::DEFAULT_WEATHER_TTL_SECS;
use moodify_core::Coordinates;
use moodify_providers::ambee::DEFAULT_AMBEE_BASE_URL;
use std::path::PathBuf;

const FERPLUS_MODEL_FILE: &str = "ferplus_model_pd_best.onnx";
const CASCADE_FILE: &str = "haarcascade_frontalface_default.xml";

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the classifier model and, by default, the cascade.
    pub model_dir: PathBuf,
    /// Haar cascade XML (default: `<model_dir>/haarcascade_frontalface_default.xml`).
    pub cascade_path: PathBuf,
    /// Mood table override. `None` uses the embedded table.
    pub table_path: Option<PathBuf>,
    pub ambee_api_key: Option<String>,
    pub ambee_base_url: String,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    /// Weather cache lifetime in seconds.
    pub weather_ttl_secs: i64,
    /// Per-request timeout for weather and catalog calls.
    pub http_timeout_secs: u64,
    /// Coordinates used when none are given on the command line.
    pub default_location: Coordinates,
    /// Seed for reproducible track choice. `None` draws from the thread RNG.
    pub track_seed: Option<u64>,
}

impl Config {
    /// Load configuration from `MOODIFY_*` (and provider credential) environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = var("MOODIFY_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./model"));

        let cascade_path = var("MOODIFY_CASCADE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| model_dir.join(CASCADE_FILE));

        Self {
            cascade_path,
            table_path: var("MOODIFY_TABLE_PATH").map(PathBuf::from),
            ambee_api_key: non_empty(var("AMBEE_API_KEY")),
            ambee_base_url: var("MOODIFY_AMBEE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_AMBEE_BASE_URL.to_string()),
            spotify_client_id: non_empty(var("SPOTIFY_CLIENT_ID")),
            spotify_client_secret: non_empty(var("SPOTIFY_CLIENT_SECRET")),
            weather_ttl_secs: parsed(&var, "MOODIFY_WEATHER_TTL_SECS", DEFAULT_WEATHER_TTL_SECS),
            http_timeout_secs: parsed(&var, "MOODIFY_HTTP_TIMEOUT_SECS", 10),
            default_location: Coordinates::new(
                parsed(&var, "MOODIFY_DEFAULT_LAT", 18.5204),
                parsed(&var, "MOODIFY_DEFAULT_LNG", 73.8567),
            ),
            track_seed: var("MOODIFY_TRACK_SEED").and_then(|v| v.parse().ok()),
            model_dir,
        }
    }

    /// Path to the FER+ emotion model.
    pub fn classifier_model_path(&self) -> PathBuf {
        self.model_dir.join(FERPLUS_MODEL_FILE)
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
