//! Weather classification. Maps a raw provider observation to a [`WeatherKey`].
//!
//! Rules run in priority order and the first match wins:
//! icon, precipitation intensity, visibility, free-text summary.
//! Every field is optional; unparseable numbers count as absent.

use crate::types::WeatherKey;
use serde_json::Value;

const CLOUDY_COVER_THRESHOLD: f64 = 0.6;
/// In the provider's distance unit (meters).
const FOG_VISIBILITY_THRESHOLD: f64 = 2000.0;

const CLOUD_COVER_FIELDS: [&str; 3] = ["cloudCover", "cloud_cover", "clouds"];
const PRECIPITATION_FIELDS: [&str; 3] = ["precipitationIntensity", "precipIntensity", "rain"];

/// Keys an icon may name verbatim.
const DIRECT_ICON_KEYS: [WeatherKey; 6] = [
    WeatherKey::Clear,
    WeatherKey::PartlyCloudy,
    WeatherKey::Cloudy,
    WeatherKey::Rain,
    WeatherKey::Snow,
    WeatherKey::Fog,
];

/// Ordered summary keyword rules.
const SUMMARY_RULES: [(&[&str], WeatherKey); 6] = [
    (&["thunder", "lightning"], WeatherKey::Thunderstorm),
    (&["snow"], WeatherKey::Snow),
    (&["rain", "drizzle"], WeatherKey::Rain),
    (&["fog", "mist", "haze"], WeatherKey::Fog),
    (&["clear"], WeatherKey::Clear),
    (&["cloud"], WeatherKey::PartlyCloudy),
];

/// Classify a provider observation. Non-object input yields [`WeatherKey::Any`].
pub fn classify_weather(data: &Value) -> WeatherKey {
    if !data.is_object() {
        return WeatherKey::Any;
    }

    if let Some(key) = icon(data).and_then(|icon| classify_icon(&icon, data)) {
        return key;
    }

    if let Some(precip) = first_number(data, &PRECIPITATION_FIELDS) {
        if precip > 0.0 {
            return WeatherKey::Rain;
        }
    }

    if let Some(visibility) = data.get("visibility").and_then(as_number) {
        if visibility < FOG_VISIBILITY_THRESHOLD {
            return WeatherKey::Fog;
        }
    }

    if let Some(summary) = data.get("summary").and_then(Value::as_str) {
        let summary = summary.to_lowercase();
        for (keywords, key) in SUMMARY_RULES {
            if keywords.iter().any(|k| summary.contains(k)) {
                return key;
            }
        }
    }

    WeatherKey::Any
}

/// Top-level `icon`, else `weather.icon`; lower-cased. An empty icon counts as absent.
fn icon(data: &Value) -> Option<String> {
    data.get("icon")
        .filter(|v| is_truthy(v))
        .or_else(|| data.get("weather").and_then(|w| w.get("icon")))
        .filter(|v| is_truthy(v))
        .and_then(Value::as_str)
        .map(str::to_lowercase)
}

fn classify_icon(icon: &str, data: &Value) -> Option<WeatherKey> {
    // The bare `cloudy` icon defers to a cover reading when one is given.
    if icon == WeatherKey::Cloudy.as_str() {
        return Some(cloud_cover_key(data).unwrap_or(WeatherKey::Cloudy));
    }

    if let Some(key) = DIRECT_ICON_KEYS.iter().find(|k| k.as_str() == icon) {
        return Some(*key);
    }

    if icon.contains("clear") {
        Some(WeatherKey::Clear)
    } else if icon.contains("cloud") {
        Some(cloud_cover_key(data).unwrap_or(WeatherKey::PartlyCloudy))
    } else if icon.contains("rain") || icon.contains("drizzle") {
        Some(WeatherKey::Rain)
    } else if icon.contains("snow") {
        Some(WeatherKey::Snow)
    } else if icon.contains("fog") || icon.contains("mist") {
        Some(WeatherKey::Fog)
    } else {
        None
    }
}

fn cloud_cover_key(data: &Value) -> Option<WeatherKey> {
    first_number(data, &CLOUD_COVER_FIELDS).map(|cover| {
        if cover >= CLOUDY_COVER_THRESHOLD {
            WeatherKey::Cloudy
        } else {
            WeatherKey::PartlyCloudy
        }
    })
}

/// Value of the first alias that is set (non-zero, non-empty), parsed as a number.
fn first_number(data: &Value, fields: &[&str]) -> Option<f64> {
    fields
        .iter()
        .find_map(|f| data.get(*f).filter(|v| is_truthy(v)))
        .and_then(as_number)
}

/// `null`, `false`, zero, `""` and empty containers are unset.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Accept JSON numbers and numeric strings; anything else is absent.
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_icon_clear_day() {
        assert_eq!(classify_weather(&json!({"icon": "clear-day"})), WeatherKey::Clear);
    }

    #[test]
    fn test_icon_cloudy_with_high_cover() {
        assert_eq!(classify_weather(&json!({"icon": "cloudy", "cloudCover": 0.8})), WeatherKey::Cloudy);
    }

    #[test]
    fn test_icon_cloudy_with_low_cover() {
        assert_eq!(
            classify_weather(&json!({"icon": "cloudy", "cloudCover": 0.2})),
            WeatherKey::PartlyCloudy
        );
    }

    #[test]
    fn test_icon_cloud_variants_without_cover() {
        assert_eq!(classify_weather(&json!({"icon": "cloudy"})), WeatherKey::Cloudy);
        assert_eq!(classify_weather(&json!({"icon": "partly-cloudy"})), WeatherKey::PartlyCloudy);
        assert_eq!(classify_weather(&json!({"icon": "partly-cloudy-night"})), WeatherKey::PartlyCloudy);
        assert_eq!(
            classify_weather(&json!({"icon": "Partly-Cloudy-Day", "cloud_cover": "0.75"})),
            WeatherKey::Cloudy
        );
    }

    #[test]
    fn test_icon_direct_and_substring_matches() {
        assert_eq!(classify_weather(&json!({"icon": "FOG"})), WeatherKey::Fog);
        assert_eq!(classify_weather(&json!({"icon": "light-drizzle"})), WeatherKey::Rain);
        assert_eq!(classify_weather(&json!({"icon": "snow-showers"})), WeatherKey::Snow);
        assert_eq!(classify_weather(&json!({"icon": "mist"})), WeatherKey::Fog);
        assert_eq!(classify_weather(&json!({"weather": {"icon": "rain"}})), WeatherKey::Rain);
    }

    #[test]
    fn test_exact_partly_cloudy_icon_ignores_cover() {
        assert_eq!(
            classify_weather(&json!({"icon": "partly-cloudy", "cloudCover": 0.8})),
            WeatherKey::PartlyCloudy
        );
        assert_eq!(
            classify_weather(&json!({"icon": "partly-cloudy", "cloudCover": 0.1})),
            WeatherKey::PartlyCloudy
        );
    }

    #[test]
    fn test_unset_alias_defers_to_next() {
        assert_eq!(
            classify_weather(&json!({"precipitationIntensity": 0, "rain": 2.5})),
            WeatherKey::Rain
        );
        assert_eq!(
            classify_weather(&json!({"icon": "", "weather": {"icon": "snow"}})),
            WeatherKey::Snow
        );
        assert_eq!(
            classify_weather(&json!({"icon": "cloudy", "cloudCover": 0, "clouds": 0.9})),
            WeatherKey::Cloudy
        );
        assert_eq!(
            classify_weather(&json!({"icon": "overcast-clouds", "cloud_cover": "", "clouds": 0.3})),
            WeatherKey::PartlyCloudy
        );
    }

    #[test]
    fn test_unmatched_icon_falls_through() {
        assert_eq!(
            classify_weather(&json!({"icon": "wind", "precipIntensity": 1.2})),
            WeatherKey::Rain
        );
    }

    #[test]
    fn test_precipitation_without_icon() {
        assert_eq!(classify_weather(&json!({"precipitationIntensity": 3.0})), WeatherKey::Rain);
        assert_eq!(classify_weather(&json!({"rain": "0.05"})), WeatherKey::Rain);
    }

    #[test]
    fn test_zero_precipitation_is_not_rain() {
        assert_eq!(classify_weather(&json!({"precipitationIntensity": 0})), WeatherKey::Any);
    }

    #[test]
    fn test_visibility_without_icon_or_precip() {
        assert_eq!(classify_weather(&json!({"visibility": 500})), WeatherKey::Fog);
        assert_eq!(classify_weather(&json!({"visibility": 10000})), WeatherKey::Any);
    }

    #[test]
    fn test_summary_thunder() {
        assert_eq!(classify_weather(&json!({"summary": "chance of thunder"})), WeatherKey::Thunderstorm);
    }

    #[test]
    fn test_summary_keyword_order() {
        assert_eq!(classify_weather(&json!({"summary": "Rain and Snow"})), WeatherKey::Snow);
        assert_eq!(classify_weather(&json!({"summary": "Haze"})), WeatherKey::Fog);
        assert_eq!(classify_weather(&json!({"summary": "Mostly Cloudy"})), WeatherKey::PartlyCloudy);
        assert_eq!(classify_weather(&json!({"summary": "Clear skies, some clouds later"})), WeatherKey::Clear);
    }

    #[test]
    fn test_empty_and_malformed() {
        assert_eq!(classify_weather(&json!({})), WeatherKey::Any);
        assert_eq!(classify_weather(&json!(null)), WeatherKey::Any);
        assert_eq!(classify_weather(&json!("sunny")), WeatherKey::Any);
        assert_eq!(classify_weather(&json!([1, 2])), WeatherKey::Any);
    }

    #[test]
    fn test_unparseable_numbers_skip_to_next_rule() {
        let data = json!({
            "precipitationIntensity": "heavy",
            "visibility": "low",
            "summary": "drizzle"
        });
        assert_eq!(classify_weather(&data), WeatherKey::Rain);

        let data = json!({"icon": "cloudy", "cloudCover": "lots"});
        assert_eq!(classify_weather(&data), WeatherKey::Cloudy);

        let data = json!({"visibility": "NaN", "summary": "fog bank"});
        assert_eq!(classify_weather(&data), WeatherKey::Fog);
    }

    #[test]
    fn test_non_string_icon_is_ignored() {
        assert_eq!(classify_weather(&json!({"icon": 3, "visibility": 100})), WeatherKey::Fog);
    }
}
