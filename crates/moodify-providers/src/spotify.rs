//! Spotify catalog lookup: track name to a shareable URL.
//!
//! Lookup never fails from the caller's point of view. Any problem
//! (no credentials, token refusal, transport error, empty result)
//! degrades to an `open.spotify.com` search link for the track.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com";
const FALLBACK_SEARCH_BASE: &str = "https://open.spotify.com/search";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog returned status {0}")]
    Status(u16),
    #[error("no catalog token")]
    NoToken,
    #[error("no match for {0:?}")]
    NoMatch(String),
}

/// Resolves a track title to a link a listener can open.
pub trait CatalogSearch: Send + Sync {
    fn track_url(&self, track: &str) -> String;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct SpotifyCatalog {
    http: reqwest::blocking::Client,
    token: Option<String>,
    api_base: String,
}

impl SpotifyCatalog {
    /// Obtain a client-credentials token. Missing credentials or a refused
    /// token leave the catalog in fallback-only mode.
    pub fn connect(client_id: Option<&str>, client_secret: Option<&str>, timeout: Duration) -> Self {
        let http = match reqwest::blocking::Client::builder().timeout(timeout).build() {
            Ok(http) => http,
            Err(e) => {
                tracing::warn!(error = %e, "HTTP client setup failed; using default client");
                reqwest::blocking::Client::new()
            }
        };

        let token = match (client_id, client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                match request_token(&http, id, secret) {
                    Ok(token) => {
                        tracing::info!("spotify token acquired");
                        Some(token)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "spotify token request failed; links fall back to search");
                        None
                    }
                }
            }
            _ => {
                tracing::warn!("SPOTIFY_CLIENT_ID/SPOTIFY_CLIENT_SECRET not set; links fall back to search");
                None
            }
        };

        Self {
            http,
            token,
            api_base: API_BASE.to_string(),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// First search hit's `external_urls.spotify`.
    pub fn search(&self, track: &str) -> Result<String, CatalogError> {
        let token = self.token.as_deref().ok_or(CatalogError::NoToken)?;

        let response = self
            .http
            .get(format!("{}/v1/search", self.api_base))
            .query(&[("q", track), ("type", "track"), ("limit", "1")])
            .bearer_auth(token)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        let body: Value = response.json()?;
        first_track_url(&body).ok_or_else(|| CatalogError::NoMatch(track.to_string()))
    }
}

impl CatalogSearch for SpotifyCatalog {
    fn track_url(&self, track: &str) -> String {
        match self.search(track) {
            Ok(url) => url,
            Err(CatalogError::NoToken) => fallback_url(track),
            Err(e) => {
                tracing::debug!(error = %e, track, "catalog search failed; using search link");
                fallback_url(track)
            }
        }
    }
}

fn request_token(http: &reqwest::blocking::Client, id: &str, secret: &str) -> Result<String, CatalogError> {
    let response = http
        .post(TOKEN_URL)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", id),
            ("client_secret", secret),
        ])
        .send()?;

    let status = response.status();
    if !status.is_success() {
        return Err(CatalogError::Status(status.as_u16()));
    }
    Ok(response.json::<TokenResponse>()?.access_token)
}

fn first_track_url(body: &Value) -> Option<String> {
    body.pointer("/tracks/items/0/external_urls/spotify")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `https://open.spotify.com/search/<track>` with the track as one
/// percent-encoded path segment.
pub fn fallback_url(track: &str) -> String {
    let Ok(mut url) = reqwest::Url::parse(FALLBACK_SEARCH_BASE) else {
        return FALLBACK_SEARCH_BASE.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(track);
    }
    url.to_string()
}
