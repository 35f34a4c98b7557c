//! Cached weather resolution.
//!
//! One cache slot is shared by all callers regardless of coordinates. The
//! freshness check, provider fetch and slot update run under a single
//! lock, so concurrent callers never issue duplicate fetches or overwrite
//! a newer entry with an older one.

use crate::types::{Coordinates, WeatherKey};
use crate::weather::classify_weather;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

pub const DEFAULT_WEATHER_TTL_SECS: i64 = 600;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("weather request failed: {0}")]
    Transport(String),
    #[error("weather provider returned status {0}")]
    Status(u16),
    #[error("malformed weather response: {0}")]
    Malformed(String),
    #[error("weather provider not configured: {0}")]
    Unconfigured(&'static str),
}

/// External source of raw weather observations.
///
/// Implementations should bound their own request time and report
/// expiry as an error.
pub trait WeatherProvider: Send + Sync {
    fn fetch(&self, at: Coordinates) -> Result<Value, ProviderError>;
}

/// Wall-clock source, replaceable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The single cached weather classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeatherCacheEntry {
    pub key: WeatherKey,
    pub fetched_at: DateTime<Utc>,
    /// Where the entry was fetched for. Informational only; not part of the cache key.
    pub coordinates: Coordinates,
}

impl WeatherCacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.fetched_at < ttl
    }
}

pub struct WeatherResolver {
    provider: Box<dyn WeatherProvider>,
    clock: Box<dyn Clock>,
    ttl: Duration,
    slot: Mutex<Option<WeatherCacheEntry>>,
}

impl WeatherResolver {
    pub fn new(provider: Box<dyn WeatherProvider>) -> Self {
        Self::with_clock(provider, Box::new(SystemClock))
    }

    pub fn with_clock(provider: Box<dyn WeatherProvider>, clock: Box<dyn Clock>) -> Self {
        Self {
            provider,
            clock,
            ttl: Duration::seconds(DEFAULT_WEATHER_TTL_SECS),
            slot: Mutex::new(None),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached key while fresh; otherwise fetch and classify.
    ///
    /// A failed fetch returns the previous key (even if stale) and keeps the
    /// entry; with no entry it returns [`WeatherKey::Any`].
    pub fn resolve(&self, at: Coordinates) -> WeatherKey {
        let mut slot = self.lock_slot();
        let now = self.clock.now();

        if let Some(entry) = slot.as_ref() {
            if entry.is_fresh(now, self.ttl) {
                if entry.coordinates != at {
                    tracing::debug!(
                        cached = ?entry.coordinates,
                        requested = ?at,
                        "weather cache is location-independent; serving cached entry"
                    );
                }
                tracing::debug!(key = %entry.key, age_secs = (now - entry.fetched_at).num_seconds(), "weather cache hit");
                return entry.key;
            }
        }

        match self.provider.fetch(at) {
            Ok(data) => {
                let key = classify_weather(&data);
                *slot = Some(WeatherCacheEntry {
                    key,
                    fetched_at: now,
                    coordinates: at,
                });
                tracing::info!(%key, lat = at.lat, lng = at.lng, "weather refreshed");
                key
            }
            Err(e) => {
                let fallback = slot.as_ref().map_or(WeatherKey::Any, |entry| entry.key);
                tracing::warn!(error = %e, %fallback, stale = slot.is_some(), "weather fetch failed; using fallback");
                fallback
            }
        }
    }

    /// Snapshot of the cache slot, for diagnostics.
    pub fn cached(&self) -> Option<WeatherCacheEntry> {
        *self.lock_slot()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<WeatherCacheEntry>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Arc;

    const HERE: Coordinates = Coordinates { lat: 18.5204, lng: 73.8567 };

    /// Clock pinned to an epoch plus a controllable offset in seconds.
    #[derive(Clone, Default)]
    pub(crate) struct FakeClock(Arc<AtomicI64>);

    impl FakeClock {
        pub(crate) fn advance(&self, secs: i64) {
            self.0.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            let secs = 1_700_000_000 + self.0.load(Ordering::SeqCst);
            Utc.timestamp_opt(secs, 0).single().unwrap()
        }
    }

    /// Replays scripted responses (repeating the last) and counts fetches.
    #[derive(Clone)]
    pub(crate) struct ScriptedProvider {
        responses: Arc<Mutex<VecDeque<Result<Value, u16>>>>,
        calls: Arc<AtomicUsize>,
        delay: std::time::Duration,
    }

    impl ScriptedProvider {
        pub(crate) fn new(responses: Vec<Result<Value, u16>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(responses.into())),
                calls: Arc::new(AtomicUsize::new(0)),
                delay: std::time::Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: std::time::Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl WeatherProvider for ScriptedProvider {
        fn fetch(&self, _at: Coordinates) -> Result<Value, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            let mut queue = self.responses.lock().unwrap();
            let next = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
            match next {
                Some(Ok(v)) => Ok(v),
                Some(Err(status)) => Err(ProviderError::Status(status)),
                None => Err(ProviderError::Transport("no scripted response".into())),
            }
        }
    }

    fn resolver(provider: &ScriptedProvider, clock: &FakeClock) -> WeatherResolver {
        WeatherResolver::with_clock(Box::new(provider.clone()), Box::new(clock.clone()))
    }

    #[test]
    fn test_first_resolve_fetches_and_caches() {
        let provider = ScriptedProvider::new(vec![Ok(json!({"icon": "rain"}))]);
        let clock = FakeClock::default();
        let r = resolver(&provider, &clock);

        assert_eq!(r.resolve(HERE), WeatherKey::Rain);
        assert_eq!(provider.calls(), 1);
        let entry = r.cached().unwrap();
        assert_eq!(entry.key, WeatherKey::Rain);
        assert_eq!(entry.fetched_at, clock.now());
    }

    #[test]
    fn test_no_refetch_at_599_seconds() {
        let provider = ScriptedProvider::new(vec![Ok(json!({"icon": "rain"})), Ok(json!({"icon": "snow"}))]);
        let clock = FakeClock::default();
        let r = resolver(&provider, &clock);

        r.resolve(HERE);
        clock.advance(599);
        assert_eq!(r.resolve(HERE), WeatherKey::Rain);
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn test_refetch_at_601_seconds() {
        let provider = ScriptedProvider::new(vec![Ok(json!({"icon": "rain"})), Ok(json!({"icon": "snow"}))]);
        let clock = FakeClock::default();
        let r = resolver(&provider, &clock);

        r.resolve(HERE);
        clock.advance(601);
        assert_eq!(r.resolve(HERE), WeatherKey::Snow);
        assert_eq!(provider.calls(), 2);
        assert_eq!(r.cached().unwrap().fetched_at, clock.now());
    }

    #[test]
    fn test_entry_expires_at_exactly_ttl() {
        let provider = ScriptedProvider::new(vec![Ok(json!({"icon": "fog"}))]);
        let clock = FakeClock::default();
        let r = resolver(&provider, &clock);

        r.resolve(HERE);
        clock.advance(600);
        r.resolve(HERE);
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_failure_without_cache_returns_any() {
        let provider = ScriptedProvider::new(vec![Err(503)]);
        let clock = FakeClock::default();
        let r = resolver(&provider, &clock);

        assert_eq!(r.resolve(HERE), WeatherKey::Any);
        assert!(r.cached().is_none());
    }

    #[test]
    fn test_failure_keeps_stale_entry() {
        let provider = ScriptedProvider::new(vec![Ok(json!({"icon": "clear-day"})), Err(500)]);
        let clock = FakeClock::default();
        let r = resolver(&provider, &clock);

        r.resolve(HERE);
        let first = r.cached().unwrap();
        clock.advance(3600);
        assert_eq!(r.resolve(HERE), WeatherKey::Clear);
        assert_eq!(provider.calls(), 2);
        assert_eq!(r.cached(), Some(first), "failed refresh must not replace the entry");

        // Still stale, so the next call retries.
        r.resolve(HERE);
        assert_eq!(provider.calls(), 3);
    }

    #[test]
    fn test_cache_ignores_coordinates() {
        let provider = ScriptedProvider::new(vec![Ok(json!({"icon": "rain"})), Ok(json!({"icon": "snow"}))]);
        let clock = FakeClock::default();
        let r = resolver(&provider, &clock);

        r.resolve(HERE);
        assert_eq!(r.resolve(Coordinates::new(-33.86, 151.21)), WeatherKey::Rain);
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn test_custom_ttl() {
        let provider = ScriptedProvider::new(vec![Ok(json!({"icon": "rain"}))]);
        let clock = FakeClock::default();
        let r = resolver(&provider, &clock).with_ttl(Duration::seconds(30));

        r.resolve(HERE);
        clock.advance(31);
        r.resolve(HERE);
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_concurrent_resolves_fetch_once() {
        let provider = ScriptedProvider::new(vec![Ok(json!({"icon": "snow"}))])
            .with_delay(std::time::Duration::from_millis(20));
        let clock = FakeClock::default();
        let r = resolver(&provider, &clock);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| assert_eq!(r.resolve(HERE), WeatherKey::Snow));
            }
        });
        assert_eq!(provider.calls(), 1);
    }
}
