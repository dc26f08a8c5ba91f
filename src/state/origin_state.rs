use crate::url::origin_key;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use url::Url;

/// Tracks the pacing state of one origin
#[derive(Debug, Clone, Default)]
pub struct OriginState {
    /// Number of requests dispatched to this origin
    pub request_count: u32,

    /// Start time reserved for the most recent request
    pub last_slot: Option<Instant>,
}

impl OriginState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next request slot for this origin
    ///
    /// The slot is `max(now, last_slot + delay)` and becomes the new
    /// `last_slot`, so concurrent callers queue up behind each other.
    /// A delay too large to represent as an instant leaves the slot at
    /// `last_slot`.
    pub fn reserve(&mut self, delay: Duration, now: Instant) -> Instant {
        let slot = match self.last_slot {
            Some(last) => last.checked_add(delay).unwrap_or(last).max(now),
            None => now,
        };
        self.last_slot = Some(slot);
        self.request_count = self.request_count.saturating_add(1);
        slot
    }
}

/// Per-origin politeness pacing shared by all workers
#[derive(Debug)]
pub struct OriginPacer {
    delay: Duration,
    origins: Mutex<HashMap<String, OriginState>>,
}

impl OriginPacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            origins: Mutex::new(HashMap::new()),
        }
    }

    /// Reserves a slot for `url` and returns the instant it may start
    pub fn reserve(&self, url: &Url, now: Instant) -> Instant {
        if self.delay.is_zero() {
            return now;
        }
        let mut origins = self.origins.lock().unwrap_or_else(|e| e.into_inner());
        origins
            .entry(origin_key(url))
            .or_default()
            .reserve(self.delay, now)
    }

    /// Waits until a request to `url` is allowed
    pub async fn wait(&self, url: &Url) {
        let now = Instant::now();
        let slot = self.reserve(url, now);
        if slot > now {
            tracing::trace!("Pacing {} for {:?}", origin_key(url), slot - now);
            tokio::time::sleep_until(tokio::time::Instant::from_std(slot)).await;
        }
    }

    /// Returns the number of requests dispatched to the origin of `url`
    pub fn request_count(&self, url: &Url) -> u32 {
        let origins = self.origins.lock().unwrap_or_else(|e| e.into_inner());
        origins
            .get(&origin_key(url))
            .map_or(0, |state| state.request_count)
    }
}
