//! coinwatch - Track cryptocurrency prices from the terminal
//!
//! Fetches market data for a fixed watch list from the CoinGecko API, with
//! caching, rate-limit-aware fetching and offline fallbacks so there is
//! always something to show.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use coinwatch::cache::ApiCache;
use coinwatch::cli::{Cli, Mode};
use coinwatch::data::CoinGeckoClient;
use coinwatch::ratelimit::RateLimitWindow;
use coinwatch::render::{Render, TextRenderer};
use coinwatch::service::{MarketService, ServiceEvent, Snapshot};
use coinwatch::store::{FileStore, KvStore, MemoryStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Fall back to a memory-only store when no cache directory exists, so
    // the app still runs without persistence.
    let store: Arc<dyn KvStore> = match FileStore::new() {
        Some(store) => Arc::new(store),
        None => {
            tracing::warn!("no cache directory available, caching in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let cache = Arc::new(ApiCache::new(Arc::clone(&store)));
    cache.init();
    let limiter = Arc::new(RateLimitWindow::new(store));
    let api = Arc::new(CoinGeckoClient::new());

    let (service, mut events) = MarketService::new(api, cache, limiter);
    let renderer = TextRenderer;

    match Mode::from_cli(&cli) {
        Mode::Search { term } => match service.search(&term).await {
            Some(outcome) => {
                if let Some(advisory) = &outcome.advisory {
                    println!("{advisory}");
                }
                if outcome.entries.is_empty() {
                    println!("No matching cryptocurrencies found.");
                } else {
                    renderer.render(&outcome.entries, false);
                }
            }
            None => println!("Enter at least 2 characters to search."),
        },
        Mode::Snapshot { watch } => {
            let snapshot = service.snapshot().await;
            show_snapshot(&renderer, &snapshot, false);

            if watch {
                while let Some(ServiceEvent::RefreshDue) = events.recv().await {
                    let snapshot = service.snapshot().await;
                    show_snapshot(&renderer, &snapshot, true);
                }
            }
        }
    }
}

fn show_snapshot(renderer: &TextRenderer, snapshot: &Snapshot, animate: bool) {
    if let Some(advisory) = &snapshot.advisory {
        println!("{advisory}");
    }
    renderer.render(&snapshot.entries, animate);
    println!("Updated {}", snapshot.fetched_at.format("%H:%M:%S UTC"));
}
