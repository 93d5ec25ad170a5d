//! Static fallback data for popular coins
//!
//! Served when the upstream API is unreachable or rate limited so the app
//! always has something to show. Figures are representative snapshots, not
//! live data, and every entry produced here is flagged as fallback.

use rand::Rng;

use super::assets;
use super::MarketEntry;

/// A coin in the offline fallback table.
#[derive(Debug, Clone, Copy)]
pub struct FallbackCoin {
    pub id: &'static str,
    pub name: &'static str,
    pub symbol: &'static str,
    pub price: f64,
    pub change_pct_24h: f64,
}

/// Representative figures for the most-traded coins.
const POPULAR_COINS: [FallbackCoin; 9] = [
    FallbackCoin { id: "bitcoin", name: "Bitcoin", symbol: "BTC", price: 67500.0, change_pct_24h: 2.5 },
    FallbackCoin { id: "ethereum", name: "Ethereum", symbol: "ETH", price: 3400.0, change_pct_24h: 1.8 },
    FallbackCoin { id: "dogecoin", name: "Dogecoin", symbol: "DOGE", price: 0.14, change_pct_24h: 1.2 },
    FallbackCoin { id: "solana", name: "Solana", symbol: "SOL", price: 152.0, change_pct_24h: 3.1 },
    FallbackCoin { id: "ripple", name: "XRP", symbol: "XRP", price: 0.49, change_pct_24h: -0.8 },
    FallbackCoin { id: "cardano", name: "Cardano", symbol: "ADA", price: 0.45, change_pct_24h: 0.3 },
    FallbackCoin { id: "tether", name: "Tether", symbol: "USDT", price: 1.0, change_pct_24h: 0.01 },
    FallbackCoin { id: "binancecoin", name: "BNB", symbol: "BNB", price: 560.0, change_pct_24h: 1.5 },
    FallbackCoin { id: "polkadot", name: "Polkadot", symbol: "DOT", price: 6.7, change_pct_24h: 0.7 },
];

/// Nominal volume and market cap attached to fallback entries so the figures
/// render as plausible magnitudes rather than blanks.
const NOMINAL_VOLUME: f64 = 1_000_000_000.0;
const NOMINAL_MARKET_CAP: f64 = 10_000_000_000.0;

/// Looks up a coin in the fallback table by id.
pub fn lookup(id: &str) -> Option<&'static FallbackCoin> {
    POPULAR_COINS.iter().find(|coin| coin.id == id)
}

/// Returns fallback coins whose name or symbol contains `term`,
/// case-insensitively.
pub fn search(term: &str) -> Vec<&'static FallbackCoin> {
    let term = term.to_lowercase();
    POPULAR_COINS
        .iter()
        .filter(|coin| {
            coin.name.to_lowercase().contains(&term) || coin.symbol.to_lowercase().contains(&term)
        })
        .collect()
}

/// Builds a complete fallback entry for `id`.
///
/// Known coins get the table's price and change plus nominal volume and
/// market cap; unknown coins get their display name where we have one (the
/// raw id otherwise) with every figure marked unavailable.
pub fn fallback_market_entry(id: &str) -> MarketEntry {
    match lookup(id) {
        Some(coin) => market_entry(coin),
        None => {
            let (name, symbol) = match assets::display_info(id) {
                Some((name, symbol)) => (name.to_string(), symbol.to_string()),
                None => (id.to_string(), id.to_uppercase()),
            };
            MarketEntry {
                id: id.to_string(),
                name,
                symbol,
                current_price: None,
                price_change_pct_24h: 0.0,
                total_volume: None,
                market_cap: None,
                image: None,
                sparkline_7d: None,
                is_fallback: true,
            }
        }
    }
}

/// Converts a fallback table row into a full entry.
pub fn market_entry(coin: &FallbackCoin) -> MarketEntry {
    MarketEntry {
        id: coin.id.to_string(),
        name: coin.name.to_string(),
        symbol: coin.symbol.to_string(),
        current_price: Some(coin.price),
        price_change_pct_24h: coin.change_pct_24h,
        total_volume: Some(NOMINAL_VOLUME),
        market_cap: Some(NOMINAL_MARKET_CAP),
        image: Some(assets::image_url(coin.id)),
        sparkline_7d: None,
        is_fallback: true,
    }
}

/// Generates a plausible-looking 7-day hourly sparkline around `price`.
///
/// The series drifts slightly in the direction of the 24h change with a
/// little noise, so fallback cards still get a chart. 168 points, one per
/// hour over a week.
pub fn synthetic_sparkline(price: Option<f64>, trending_up: bool) -> Vec<f64> {
    let mut rng = rand::thread_rng();
    let trend = if trending_up { 1.0002 } else { 0.9998 };
    let mut current = price.unwrap_or(100.0);

    (0..168)
        .map(|_| {
            let jitter: f64 = rng.gen_range(0.99..1.01);
            current = current * trend * jitter;
            current
        })
        .collect()
}
