//! Exchange adapters: a uniform async view over each venue's futures REST
//! API, with shared per-exchange rate limiting and transient-failure retry.
//!
//! Raw exchange payloads are parsed strictly into the typed samples of
//! `types::market` at this boundary; anything that does not parse is a
//! permanent fetch failure, never a zero.

pub mod binance;
pub mod bybit;
pub mod ratelimit;

pub use binance::BinanceSource;
pub use bybit::BybitSource;
pub use ratelimit::TokenBucket;

use crate::config::Config;
use crate::error::{Result, ScanError};
use crate::types::{Candle, OrderBook, TickerData};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-request timeout applied by every adapter.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Transient failures are retried this many times with exponential backoff.
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(400);

/// Uniform view over one exchange's perpetual-futures market data.
///
/// All methods take the normalized base symbol (e.g. `"WIF"`); adapters map
/// it to their own pair naming. Missing data surfaces as an `Err`, never as
/// a zero value.
#[async_trait]
pub trait MarketSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Base symbols of all active USDT linear perpetuals on this venue.
    async fn list_futures_symbols(&self) -> Result<Vec<String>>;

    /// Hourly candles, ascending, at most `limit`.
    async fn fetch_candles(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>>;

    async fn fetch_ticker(&self, symbol: &str) -> Result<TickerData>;

    /// Current open interest in USD notional.
    async fn fetch_open_interest(&self, symbol: &str) -> Result<f64>;

    /// Current funding rate (decimal per period).
    async fn fetch_funding_rate(&self, symbol: &str) -> Result<f64>;

    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook>;

    /// Current long/short account ratio.
    async fn fetch_ls_ratio(&self, symbol: &str) -> Result<f64>;

    /// Hourly open-interest history `(t, usd)`, ascending, for bootstrap.
    async fn fetch_oi_history(&self, symbol: &str, limit: usize) -> Result<Vec<(i64, f64)>>;

    /// Funding-rate history `(t, rate)`, ascending, for bootstrap.
    async fn fetch_funding_history(&self, symbol: &str, limit: usize) -> Result<Vec<(i64, f64)>>;

    /// Long/short ratio history `(t, ratio)`, ascending, for bootstrap.
    async fn fetch_ls_history(&self, symbol: &str, limit: usize) -> Result<Vec<(i64, f64)>>;
}

/// The set of enabled adapters, built from config.
pub struct SourceRegistry {
    sources: Vec<Arc<dyn MarketSource>>,
}

impl SourceRegistry {
    /// Instantiate adapters for every enabled exchange in the config.
    /// Unknown exchange names are a configuration error.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("prowl/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ScanError::Internal(format!("http client: {}", e)))?;

        let mut sources: Vec<Arc<dyn MarketSource>> = Vec::new();
        for exchange in config.enabled_exchanges() {
            match exchange.name.as_str() {
                "binance" => sources.push(Arc::new(BinanceSource::new(
                    client.clone(),
                    exchange.api_key.clone(),
                ))),
                "bybit" => sources.push(Arc::new(BybitSource::new(
                    client.clone(),
                    exchange.api_key.clone(),
                ))),
                other => {
                    return Err(ScanError::Config(format!("unknown exchange: {}", other)));
                }
            }
        }
        if sources.is_empty() {
            return Err(ScanError::Config("no enabled exchanges".into()));
        }
        Ok(Self { sources })
    }

    /// Assemble a registry from pre-built adapters.
    pub fn from_sources(sources: Vec<Arc<dyn MarketSource>>) -> Self {
        Self { sources }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn MarketSource>> {
        self.sources.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn MarketSource>> {
        self.sources.iter().find(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Run a fetch with retry on transient failures (timeouts, 5xx, 429), up to
/// three attempts with exponential backoff. Permanent failures return at
/// once.
pub async fn with_retry<T, F, Fut>(context: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                debug!(context, attempt, "transient failure, retrying: {}", e);
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(context, "giving up after {} attempts: {}", MAX_ATTEMPTS, e);
                }
                return Err(e);
            }
        }
    }
}

/// Strip quote/contract suffixes so every venue agrees on the base symbol.
pub fn normalize_symbol(symbol: &str) -> String {
    let mut s = symbol.to_uppercase();
    for suffix in [
        "/USDT:USDT",
        "/USDT",
        "USDT",
        "/USD:USD",
        "/USD",
        "-USDT",
        "_USDT",
        "-PERP",
        "_PERP",
        "PERP",
    ] {
        if let Some(stripped) = s.strip_suffix(suffix) {
            s = stripped.to_string();
        }
    }
    s
}

/// Numeric string field as used by both venues' JSON (`"0.0123"`).
pub(crate) fn parse_f64(raw: &str, context: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|_| ScanError::PermanentFetch(format!("{}: bad number {:?}", context, raw)))
}
