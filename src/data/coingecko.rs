//! CoinGecko API client
//!
//! Talks to the free-tier REST API. A 429 response is surfaced as its own
//! error variant so the request queue can tell "back off and retry" apart
//! from errors that should fail immediately.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use super::MarketEntry;

const API_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Errors from fetching market data.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Rate limit reached")]
    RateLimited,

    #[error("API request failed with status {0}")]
    Status(u16),

    #[error("Failed to parse API response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Request queue shut down")]
    QueueClosed,
}

impl FetchError {
    /// Whether this error means the upstream told us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// The upstream market-data operations the app depends on.
///
/// A trait so tests can drive the fetch pipeline with a scripted fake
/// instead of the network.
#[async_trait]
pub trait MarketApi: Send + Sync {
    /// Fetches market data for the given coin ids in one call.
    async fn markets(&self, ids: &[String], sparkline: bool)
        -> Result<Vec<MarketRecord>, FetchError>;

    /// Free-text search across all listed coins.
    async fn search(&self, query: &str) -> Result<SearchResponse, FetchError>;

    /// Full detail record for a single coin.
    async fn coin_detail(&self, id: &str) -> Result<CoinDetailResponse, FetchError>;
}

/// One coin's row from the bulk markets endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketRecord {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub image: Option<String>,
    pub current_price: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
    pub total_volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub sparkline_in_7d: Option<SparklineData>,
}

/// Sparkline price series as the API nests it.
#[derive(Debug, Clone, Deserialize)]
pub struct SparklineData {
    pub price: Vec<f64>,
}

/// Response from the search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub coins: Vec<SearchHit>,
}

/// One search result. Carries identity and images only; market figures
/// require a follow-up detail fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub thumb: Option<String>,
    pub large: Option<String>,
}

/// Response from the single-coin detail endpoint, trimmed to the fields the
/// app uses.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinDetailResponse {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub image: Option<ImageLinks>,
    pub market_data: Option<MarketData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageLinks {
    pub thumb: Option<String>,
    pub small: Option<String>,
    pub large: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketData {
    pub current_price: Option<UsdQuote>,
    pub price_change_percentage_24h: Option<f64>,
    pub total_volume: Option<UsdQuote>,
    pub market_cap: Option<UsdQuote>,
    pub sparkline_7d: Option<SparklineData>,
}

/// A per-currency quote map reduced to the USD figure.
#[derive(Debug, Clone, Deserialize)]
pub struct UsdQuote {
    pub usd: Option<f64>,
}

impl From<CoinDetailResponse> for MarketEntry {
    fn from(detail: CoinDetailResponse) -> Self {
        let market = detail.market_data.unwrap_or_default();
        Self {
            id: detail.id,
            name: detail.name,
            symbol: detail.symbol.to_uppercase(),
            current_price: market.current_price.and_then(|q| q.usd),
            price_change_pct_24h: market.price_change_percentage_24h.unwrap_or(0.0),
            total_volume: market.total_volume.and_then(|q| q.usd),
            market_cap: market.market_cap.and_then(|q| q.usd),
            image: detail.image.and_then(|i| i.small.or(i.large).or(i.thumb)),
            sparkline_7d: market.sparkline_7d.map(|s| s.price),
            is_fallback: false,
        }
    }
}

/// HTTP client for the CoinGecko REST API.
pub struct CoinGeckoClient {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoClient {
    /// Creates a client pointed at the public API.
    pub fn new() -> Self {
        Self::with_base_url(API_BASE_URL.to_string())
    }

    /// Creates a client with a custom base URL, for testing against a local
    /// server.
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn markets_url(&self, ids: &[String], sparkline: bool) -> String {
        format!(
            "{}/coins/markets?vs_currency=usd&ids={}&order=market_cap_desc&per_page=100&page=1&sparkline={}&price_change_percentage=24h",
            self.base_url,
            ids.join(","),
            sparkline
        )
    }

    /// Sends the request and decodes the JSON body, mapping 429 to
    /// `RateLimited` and any other non-success status to `Status`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, FetchError> {
        let response = request.send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl Default for CoinGeckoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketApi for CoinGeckoClient {
    async fn markets(
        &self,
        ids: &[String],
        sparkline: bool,
    ) -> Result<Vec<MarketRecord>, FetchError> {
        let url = self.markets_url(ids, sparkline);
        self.get_json(self.client.get(&url)).await
    }

    async fn search(&self, query: &str) -> Result<SearchResponse, FetchError> {
        let url = format!("{}/search", self.base_url);
        self.get_json(self.client.get(&url).query(&[("query", query)]))
            .await
    }

    async fn coin_detail(&self, id: &str) -> Result<CoinDetailResponse, FetchError> {
        let url = format!(
            "{}/coins/{}?localization=false&tickers=false&market_data=true&community_data=false&developer_data=false&sparkline=true",
            self.base_url, id
        );
        self.get_json(self.client.get(&url)).await
    }
}
