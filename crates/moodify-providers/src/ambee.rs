//! Ambee "latest weather by coordinates" client.

use moodify_core::{Coordinates, ProviderError, WeatherProvider};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_AMBEE_BASE_URL: &str = "https://api.ambeedata.com";

pub struct AmbeeClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AmbeeClient {
    /// Build a client. Without an API key every fetch fails with
    /// [`ProviderError::Unconfigured`] and the resolver falls back.
    pub fn new(api_key: Option<String>, base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let api_key = api_key.filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!("AMBEE_API_KEY not set; weather will always resolve to `any`");
        }

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn endpoint(&self, at: Coordinates) -> String {
        format!(
            "{}/weather/latest/by-lat-lng?lat={}&lng={}",
            self.base_url, at.lat, at.lng
        )
    }
}

impl WeatherProvider for AmbeeClient {
    fn fetch(&self, at: Coordinates) -> Result<Value, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::Unconfigured("AMBEE_API_KEY"))?;

        let url = self.endpoint(at);
        tracing::debug!(%url, "fetching weather");

        let response = self
            .http
            .get(&url)
            .header("x-api-key", key)
            .header("Content-type", "application/json")
            .send()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        unwrap_payload(body)
    }
}

/// Ambee wraps the observation in a `data` object; bare objects pass through.
fn unwrap_payload(body: Value) -> Result<Value, ProviderError> {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(data @ Value::Object(_)) => Ok(data),
            Some(other) => {
                map.insert("data".to_string(), other);
                Ok(Value::Object(map))
            }
            None => Ok(Value::Object(map)),
        },
        other => Err(ProviderError::Malformed(format!(
            "expected JSON object, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
