//! Fetch orchestration
//!
//! Ties the cache, request queue, rate-limit counter and fallback table
//! together behind two operations: a bulk market snapshot for the watch list
//! and a free-text search with per-item detail resolution. Both follow the
//! same tiered order (cache, then queued live fetch, then fallback) and both
//! always produce something renderable, flagging degraded data rather than
//! returning nothing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::{self, ApiCache};
use crate::data::{assets, fallback, MarketApi, MarketEntry};
use crate::queue::RequestQueue;
use crate::ratelimit::RateLimitWindow;

/// How long until the next automatic snapshot refresh.
const REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How many search hits get a full detail fetch.
const SEARCH_DETAIL_LIMIT: usize = 5;

/// Where a result set ultimately came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Fresh from the upstream API
    Live,
    /// Served from the expiring cache
    Cached,
    /// Filtered from the already-loaded snapshot, no I/O at all
    Loaded,
    /// Substituted from the static fallback table
    Fallback,
}

/// Result of a bulk snapshot request.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub entries: Vec<MarketEntry>,
    pub source: DataSource,
    /// Human-readable note when the data is degraded
    pub advisory: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Result of a search request.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub entries: Vec<MarketEntry>,
    pub source: DataSource,
    pub advisory: Option<String>,
}

/// Notifications emitted by the service for its driver loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEvent {
    /// The refresh interval elapsed; the driver should request a new
    /// snapshot.
    RefreshDue,
}

/// Market data service coordinating cache, queue, limiter and fallback.
pub struct MarketService {
    api: Arc<dyn MarketApi>,
    cache: Arc<ApiCache>,
    queue: RequestQueue,
    limiter: Arc<RateLimitWindow>,
    watched: Vec<String>,
    refresh_interval: Duration,
    /// Last successfully resolved snapshot, used to answer searches without
    /// touching the network
    loaded: Mutex<Vec<MarketEntry>>,
    /// Terms with a live search currently underway
    searches_in_progress: Mutex<HashSet<String>>,
    /// Bumped on every search so a slow in-flight search can detect it has
    /// been superseded and discard its results
    search_generation: AtomicU64,
    refresh_timer: Mutex<Option<JoinHandle<()>>>,
    events_tx: mpsc::UnboundedSender<ServiceEvent>,
}

/// Removes a term from the in-progress set when the search resolves, by any
/// path including early return.
struct InProgressGuard<'a> {
    searches: &'a Mutex<HashSet<String>>,
    term: String,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.searches.lock() {
            set.remove(&self.term);
        }
    }
}

impl MarketService {
    /// Creates a service over the default watch list, along with the event
    /// channel its driver loop should listen on.
    pub fn new(
        api: Arc<dyn MarketApi>,
        cache: Arc<ApiCache>,
        limiter: Arc<RateLimitWindow>,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceEvent>) {
        let watched = assets::WATCHED_IDS.iter().map(|id| id.to_string()).collect();
        Self::with_config(api, cache, limiter, watched, REFRESH_INTERVAL)
    }

    /// Creates a service with a custom watch list and refresh interval.
    pub fn with_config(
        api: Arc<dyn MarketApi>,
        cache: Arc<ApiCache>,
        limiter: Arc<RateLimitWindow>,
        watched: Vec<String>,
        refresh_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let service = Self {
            api,
            cache,
            queue: RequestQueue::new(),
            limiter,
            watched,
            refresh_interval,
            loaded: Mutex::new(Vec::new()),
            searches_in_progress: Mutex::new(HashSet::new()),
            search_generation: AtomicU64::new(0),
            refresh_timer: Mutex::new(None),
            events_tx,
        };
        (service, events_rx)
    }

    /// Fetches market data for the whole watch list.
    ///
    /// Resolution order is cache, then a queued live call, then the fallback
    /// table. Every watched id appears in the result regardless of outcome,
    /// and the next automatic refresh is scheduled either way.
    pub async fn snapshot(&self) -> Snapshot {
        let key = cache::markets_key(&self.watched);

        if let Some(entries) = self.cache.get::<Vec<MarketEntry>>(&key) {
            self.store_loaded(&entries);
            self.schedule_refresh();
            return Snapshot {
                entries,
                source: DataSource::Cached,
                advisory: None,
                fetched_at: Utc::now(),
            };
        }

        let api = Arc::clone(&self.api);
        let ids = self.watched.clone();
        let result = self
            .queue
            .run(move || {
                let api = Arc::clone(&api);
                let ids = ids.clone();
                async move { api.markets(&ids, true).await }
            })
            .await;

        let snapshot = match result {
            Ok(records) => {
                let entries: Vec<MarketEntry> =
                    records.into_iter().map(MarketEntry::from).collect();
                self.cache.set(&key, &entries);
                self.store_loaded(&entries);
                Snapshot {
                    entries,
                    source: DataSource::Live,
                    advisory: None,
                    fetched_at: Utc::now(),
                }
            }
            Err(err) => {
                tracing::warn!(%err, "bulk fetch failed, serving fallback data");
                if err.is_rate_limited() {
                    self.limiter.mark_exhausted();
                }
                let entries = self
                    .watched
                    .iter()
                    .map(|id| fallback::fallback_market_entry(id))
                    .collect();
                Snapshot {
                    entries,
                    source: DataSource::Fallback,
                    advisory: Some(format!(
                        "Error loading data: {err}. Showing fallback values; this may be due to API rate limits."
                    )),
                    fetched_at: Utc::now(),
                }
            }
        };

        self.schedule_refresh();
        snapshot
    }

    /// Searches for coins matching `term`.
    ///
    /// Returns `None` when the term is too short or a search for the same
    /// term is already underway. Resolution order: already-loaded snapshot
    /// data, cached results for the exact term, the fallback table when the
    /// call budget is spent, and finally a live search with a per-item
    /// detail fetch for the top matches.
    pub async fn search(&self, term: &str) -> Option<SearchOutcome> {
        let term = term.trim().to_lowercase();
        if term.chars().count() < 2 {
            return None;
        }

        let from_loaded = self.filter_loaded(&term);
        if !from_loaded.is_empty() {
            self.search_generation.fetch_add(1, Ordering::SeqCst);
            return Some(SearchOutcome {
                entries: from_loaded,
                source: DataSource::Loaded,
                advisory: None,
            });
        }

        if let Some(entries) = self.cache.get::<Vec<MarketEntry>>(&cache::search_key(&term)) {
            self.search_generation.fetch_add(1, Ordering::SeqCst);
            return Some(SearchOutcome {
                entries,
                source: DataSource::Cached,
                advisory: None,
            });
        }

        if self.limiter.is_exhausted() {
            self.search_generation.fetch_add(1, Ordering::SeqCst);
            return Some(fallback_search_outcome(&term));
        }

        {
            let mut in_progress = self.searches_in_progress.lock().ok()?;
            if !in_progress.insert(term.clone()) {
                // Same term already being searched; drop this duplicate.
                return None;
            }
        }
        let _guard = InProgressGuard {
            searches: &self.searches_in_progress,
            term: term.clone(),
        };

        let generation = self.search_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.live_search(&term, generation).await
    }

    /// The live search path: queued text search, then per-hit detail
    /// resolution, then a fire-and-forget sparkline backfill.
    async fn live_search(&self, term: &str, generation: u64) -> Option<SearchOutcome> {
        self.limiter.record_call();

        let api = Arc::clone(&self.api);
        let query = term.to_string();
        let result = self
            .queue
            .run(move || {
                let api = Arc::clone(&api);
                let query = query.clone();
                async move { api.search(&query).await }
            })
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%err, term, "search failed, serving fallback data");
                if err.is_rate_limited() {
                    self.limiter.mark_exhausted();
                }
                let mut outcome = fallback_search_outcome(term);
                outcome.advisory = Some(format!("Search failed: {err}. Showing fallback matches."));
                return Some(outcome);
            }
        };

        let mut entries = Vec::new();
        for hit in response.coins.into_iter().take(SEARCH_DETAIL_LIMIT) {
            entries.push(self.resolve_detail(&hit.id).await);
        }

        if self.search_generation.load(Ordering::SeqCst) != generation {
            // A newer search started while we were fetching details.
            tracing::debug!(term, "discarding superseded search results");
            return None;
        }

        self.cache.set(&cache::search_key(term), &entries);
        self.spawn_sparkline_backfill(term, &entries);

        Some(SearchOutcome {
            entries,
            source: DataSource::Live,
            advisory: None,
        })
    }

    /// Resolves full market data for one search hit: own cache entry first,
    /// then a queued detail fetch unless the call budget ran out mid-batch.
    /// A failed detail fetch degrades this one item, never the whole search.
    async fn resolve_detail(&self, id: &str) -> MarketEntry {
        let key = cache::coin_key(id);
        if let Some(entry) = self.cache.get::<MarketEntry>(&key) {
            return entry;
        }

        if self.limiter.is_exhausted() {
            return synthetic_fallback_entry(id);
        }
        self.limiter.record_call();

        let api = Arc::clone(&self.api);
        let coin_id = id.to_string();
        let result = self
            .queue
            .run(move || {
                let api = Arc::clone(&api);
                let coin_id = coin_id.clone();
                async move { api.coin_detail(&coin_id).await }
            })
            .await;

        match result {
            Ok(detail) => {
                let entry = MarketEntry::from(detail);
                self.cache.set(&key, &entry);
                entry
            }
            Err(err) => {
                tracing::warn!(%err, id, "detail fetch failed, substituting fallback");
                if err.is_rate_limited() {
                    self.limiter.mark_exhausted();
                }
                synthetic_fallback_entry(id)
            }
        }
    }

    /// Best-effort attempt to replace synthetic or missing sparklines with
    /// real ones in a single bulk call. Deliberately bypasses the queue and
    /// ignores failure.
    fn spawn_sparkline_backfill(&self, term: &str, entries: &[MarketEntry]) {
        let ids: Vec<String> = entries
            .iter()
            .filter(|e| e.sparkline_7d.is_none() || e.is_fallback)
            .map(|e| e.id.clone())
            .collect();
        if ids.is_empty() {
            return;
        }

        let api = Arc::clone(&self.api);
        let cache = Arc::clone(&self.cache);
        let search_key = cache::search_key(term);
        let mut entries = entries.to_vec();

        tokio::spawn(async move {
            let records = match api.markets(&ids, true).await {
                Ok(records) => records,
                Err(err) => {
                    tracing::debug!(%err, "sparkline backfill failed");
                    return;
                }
            };
            for record in records {
                let Some(entry) = entries.iter_mut().find(|e| e.id == record.id) else {
                    continue;
                };
                if let Some(sparkline) = record.sparkline_in_7d {
                    entry.sparkline_7d = Some(sparkline.price);
                    cache.set(&cache::coin_key(&entry.id), entry);
                }
            }
            cache.set(&search_key, &entries);
        });
    }

    /// Case-insensitive substring match on the loaded snapshot.
    fn filter_loaded(&self, term: &str) -> Vec<MarketEntry> {
        match self.loaded.lock() {
            Ok(loaded) => loaded
                .iter()
                .filter(|e| {
                    e.name.to_lowercase().contains(term)
                        || e.symbol.to_lowercase().contains(term)
                })
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn store_loaded(&self, entries: &[MarketEntry]) {
        if let Ok(mut loaded) = self.loaded.lock() {
            *loaded = entries.to_vec();
        }
    }

    /// Arms the refresh timer, cancelling any previously scheduled one so
    /// at most a single refresh is ever outstanding.
    fn schedule_refresh(&self) {
        let tx = self.events_tx.clone();
        let interval = self.refresh_interval;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = tx.send(ServiceEvent::RefreshDue);
        });

        if let Ok(mut slot) = self.refresh_timer.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }
}

impl Drop for MarketService {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.refresh_timer.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// Fallback matches for a search term, each with a synthetic sparkline so
/// the cards still get a chart.
fn fallback_search_outcome(term: &str) -> SearchOutcome {
    let entries: Vec<MarketEntry> = fallback::search(term)
        .into_iter()
        .map(|coin| synthetic_fallback_entry(coin.id))
        .collect();
    let advisory = if entries.is_empty() {
        Some("No matching cryptocurrencies found in fallback data.".to_string())
    } else {
        Some("Using fallback data due to API limits.".to_string())
    };
    SearchOutcome {
        entries,
        source: DataSource::Fallback,
        advisory,
    }
}

/// A fallback entry carrying a synthesized sparkline trending with its
/// known 24h change.
fn synthetic_fallback_entry(id: &str) -> MarketEntry {
    let mut entry = fallback::fallback_market_entry(id);
    entry.sparkline_7d = Some(fallback::synthetic_sparkline(
        entry.current_price,
        entry.price_change_pct_24h > 0.0,
    ));
    entry
}
