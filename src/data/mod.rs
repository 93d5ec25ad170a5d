//! Market data: the unified coin model, the upstream API client, static
//! asset metadata and the offline fallback table.

pub mod assets;
pub mod coingecko;
pub mod fallback;

use serde::{Deserialize, Serialize};

pub use coingecko::{CoinGeckoClient, FetchError, MarketApi};

/// One coin's market data as the rest of the app sees it.
///
/// Numeric fields are `Option` because the upstream omits them for thinly
/// traded assets and the fallback table doesn't carry them at all; `None`
/// means "unavailable" and is rendered as such, never as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEntry {
    /// Upstream asset identifier, e.g. `bitcoin`
    pub id: String,
    /// Display name, e.g. `Bitcoin`
    pub name: String,
    /// Ticker symbol, uppercased, e.g. `BTC`
    pub symbol: String,
    /// Current price in USD
    pub current_price: Option<f64>,
    /// Price change over the last 24 hours, in percent
    pub price_change_pct_24h: f64,
    /// Trading volume over the last 24 hours, in USD
    pub total_volume: Option<f64>,
    /// Market capitalization in USD
    pub market_cap: Option<f64>,
    /// URL of the coin's logo
    pub image: Option<String>,
    /// Hourly price points over the last 7 days (168 points when present)
    pub sparkline_7d: Option<Vec<f64>>,
    /// True when this entry came from the static fallback table rather than
    /// the upstream API
    #[serde(default)]
    pub is_fallback: bool,
}

impl From<coingecko::MarketRecord> for MarketEntry {
    fn from(record: coingecko::MarketRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            symbol: record.symbol.to_uppercase(),
            current_price: record.current_price,
            price_change_pct_24h: record.price_change_percentage_24h.unwrap_or(0.0),
            total_volume: record.total_volume,
            market_cap: record.market_cap,
            image: record.image,
            sparkline_7d: record.sparkline_in_7d.map(|s| s.price),
            is_fallback: false,
        }
    }
}
