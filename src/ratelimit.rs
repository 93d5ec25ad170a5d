//! Self-imposed rate-limit budget
//!
//! The upstream API allows roughly 30 calls per minute on the free tier.
//! This counter tracks our own calls in a rolling one-minute window and lets
//! callers check whether the budget is spent before making a request, so the
//! app can switch to cached or fallback data preemptively instead of eating
//! a 429. The window is persisted so restarts don't reset the count.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::KvStore;

/// Key under which the window state is persisted.
const STORE_KEY: &str = "rate_limit";

/// Length of the counting window.
const WINDOW_SECS: i64 = 60;

/// Calls allowed per window before we consider the budget spent.
const CALL_BUDGET: u32 = 25;

/// Count forced when the upstream actually returns 429, pushing the window
/// well past the budget regardless of what we had counted.
const EXHAUSTED_COUNT: u32 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WindowState {
    count: u32,
    reset_at: DateTime<Utc>,
}

impl WindowState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            reset_at: now + Duration::seconds(WINDOW_SECS),
        }
    }
}

/// Rolling one-minute call counter persisted to the durable store.
pub struct RateLimitWindow {
    store: Arc<dyn KvStore>,
    state: Mutex<WindowState>,
}

impl RateLimitWindow {
    /// Creates a counter, picking up any persisted window state.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        let now = Utc::now();
        let state = store
            .get(STORE_KEY)
            .and_then(|raw| serde_json::from_str::<WindowState>(&raw).ok())
            .filter(|s| s.reset_at > now)
            .unwrap_or_else(|| WindowState::fresh(now));

        Self {
            store,
            state: Mutex::new(state),
        }
    }

    /// Whether the current window's budget is already spent.
    pub fn is_exhausted(&self) -> bool {
        self.with_current(|state| state.count >= CALL_BUDGET)
    }

    /// Records one upstream call against the current window.
    pub fn record_call(&self) {
        self.with_current(|state| state.count += 1);
    }

    /// Forces the window into the exhausted state after an actual 429,
    /// overriding whatever we had counted ourselves.
    pub fn mark_exhausted(&self) {
        self.with_current(|state| state.count = EXHAUSTED_COUNT);
    }

    /// Runs `f` against the window, rolling it over first if it has lapsed,
    /// and persists the result.
    fn with_current<T>(&self, f: impl FnOnce(&mut WindowState) -> T) -> T {
        let now = Utc::now();
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if now > state.reset_at {
            *state = WindowState::fresh(now);
        }
        let result = f(&mut state);
        self.persist(&state);
        result
    }

    /// Best-effort write of the window state to durable storage.
    fn persist(&self, state: &WindowState) {
        if let Ok(json) = serde_json::to_string(state) {
            if let Err(err) = self.store.set(STORE_KEY, &json) {
                tracing::warn!(%err, "failed to persist rate-limit window");
            }
        }
    }
}
