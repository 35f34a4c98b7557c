use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use moodify_core::{
    Coordinates, MoodEngine, MoodTable, RandomPicker, RecommendationSelector, SeededPicker, TrackPicker,
    WeatherResolver,
};
use moodify_providers::{AmbeeClient, CatalogSearch, SpotifyCatalog};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod report;

use config::Config;
use report::AnalysisReport;

/// Upper bound on the weather cache lifetime (one year).
const MAX_WEATHER_TTL_SECS: i64 = 365 * 24 * 3600;

#[derive(Parser)]
#[command(name = "moodify", about = "Mood-aware music recommendations from a face and the weather")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the face in each image and recommend a track
    Analyze {
        /// Image files to analyze
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Latitude for the weather lookup
        #[arg(long, allow_negative_numbers = true)]
        lat: Option<f64>,
        /// Longitude for the weather lookup
        #[arg(long, allow_negative_numbers = true)]
        lng: Option<f64>,
        /// Seed the track picker for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Resolve and print the current weather key
    Weather {
        #[arg(long, allow_negative_numbers = true)]
        lat: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        lng: Option<f64>,
    },
    /// Validate a mood table and print its cell counts
    Table {
        /// Table file (defaults to MOODIFY_TABLE_PATH, then the built-in table)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Analyze { images, lat, lng, seed } => {
            let at = location(&config, lat, lng);
            analyze(&config, images, at, seed.or(config.track_seed))
        }
        Commands::Weather { lat, lng } => weather(&config, location(&config, lat, lng)),
        Commands::Table { path } => table(path.as_deref().or(config.table_path.as_deref())),
    }
}

fn analyze(config: &Config, images: Vec<PathBuf>, at: Coordinates, seed: Option<u64>) -> Result<()> {
    let table = Arc::new(load_table(config.table_path.as_deref())?);
    let picker: Box<dyn TrackPicker> = match seed {
        Some(seed) => Box::new(SeededPicker::new(seed)),
        None => Box::new(RandomPicker),
    };

    let engine = Arc::new(
        MoodEngine::load(
            &config.cascade_path,
            &config.classifier_model_path(),
            weather_resolver(config)?,
            RecommendationSelector::new(table, picker),
        )
        .context("failed to initialize mood engine")?,
    );
    let catalog: Arc<dyn CatalogSearch> = Arc::new(SpotifyCatalog::connect(
        config.spotify_client_id.as_deref(),
        config.spotify_client_secret.as_deref(),
        http_timeout(config),
    ));

    // The engine and catalog hold blocking HTTP clients, which must be
    // dropped off the runtime; the runtime is scoped to the fan-out only.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let total = images.len();
    let results = runtime.block_on(analyze_all(engine.clone(), catalog.clone(), images, at));
    drop(runtime);

    let mut failures = 0;
    for result in results {
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                failures += 1;
                tracing::error!(error = %format!("{e:#}"), "analysis failed");
                AnalysisReport::failed(&e)
            }
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {total} images failed");
    }
    Ok(())
}

/// Analyze every image concurrently against the shared engine; results keep input order.
async fn analyze_all(
    engine: Arc<MoodEngine>,
    catalog: Arc<dyn CatalogSearch>,
    images: Vec<PathBuf>,
    at: Coordinates,
) -> Vec<Result<AnalysisReport>> {
    let handles: Vec<_> = images
        .into_iter()
        .map(|path| {
            let engine = engine.clone();
            let catalog = catalog.clone();
            tokio::task::spawn_blocking(move || analyze_one(&engine, catalog.as_ref(), &path, at))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.context("analysis task panicked").and_then(|r| r));
    }
    results
}

fn analyze_one(engine: &MoodEngine, catalog: &dyn CatalogSearch, path: &Path, at: Coordinates) -> Result<AnalysisReport> {
    let frame = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgb8();

    let report = match engine.infer(&frame, at)? {
        Some(rec) => {
            let url = catalog.track_url(&rec.track);
            AnalysisReport::matched(rec, url)
        }
        None => {
            tracing::info!(image = %path.display(), "no face detected");
            AnalysisReport::no_face()
        }
    };
    Ok(report)
}

fn weather(config: &Config, at: Coordinates) -> Result<()> {
    let resolver = weather_resolver(config)?;
    let key = resolver.resolve(at);
    let fetched_at = resolver.cached().map(|entry| entry.fetched_at);

    let out = serde_json::json!({
        "weather": key,
        "display": key.display_name(),
        "fetched_at": fetched_at,
        "lat": at.lat,
        "lng": at.lng,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn table(path: Option<&Path>) -> Result<()> {
    let table = load_table(path)?;
    let source = path.map_or_else(|| "built-in".to_string(), |p| p.display().to_string());

    println!("mood table v{} ({source})", table.version());
    for emotion in table.emotions() {
        println!("  {:<10} {} cells", emotion.as_str(), table.cell_count(emotion));
    }
    Ok(())
}

fn load_table(path: Option<&Path>) -> Result<MoodTable> {
    match path {
        Some(path) => MoodTable::load(path).with_context(|| format!("invalid mood table {}", path.display())),
        None => MoodTable::builtin().context("built-in mood table is invalid"),
    }
}

fn weather_resolver(config: &Config) -> Result<WeatherResolver> {
    let provider = AmbeeClient::new(config.ambee_api_key.clone(), &config.ambee_base_url, http_timeout(config))
        .context("failed to build weather client")?;
    let ttl = chrono::Duration::seconds(config.weather_ttl_secs.clamp(0, MAX_WEATHER_TTL_SECS));
    Ok(WeatherResolver::new(Box::new(provider)).with_ttl(ttl))
}

fn http_timeout(config: &Config) -> std::time::Duration {
    std::time::Duration::from_secs(config.http_timeout_secs)
}

fn location(config: &Config, lat: Option<f64>, lng: Option<f64>) -> Coordinates {
    Coordinates::new(
        lat.unwrap_or(config.default_location.lat),
        lng.unwrap_or(config.default_location.lng),
    )
}
