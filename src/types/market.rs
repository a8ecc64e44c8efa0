use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Data sufficiency grade, aggregated as the minimum across active inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    High,
    Med,
    Low,
}

impl Quality {
    fn rank(self) -> u8 {
        match self {
            Quality::High => 2,
            Quality::Med => 1,
            Quality::Low => 0,
        }
    }

    /// Combine two grades, keeping the worse one.
    pub fn min(self, other: Quality) -> Quality {
        if self.rank() <= other.rank() {
            self
        } else {
            other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::High => "HIGH",
            Quality::Med => "MED",
            Quality::Low => "LOW",
        }
    }
}

/// One hourly OHLCV candle. Timestamps are unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub t: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One side level of an order book. `amount` is in base units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub amount: f64,
}

impl BookLevel {
    /// Notional value of this level in quote currency.
    pub fn notional(&self) -> f64 {
        self.price * self.amount
    }
}

/// Order book snapshot for one exchange. Ephemeral: only the latest is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub t: i64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// Live ticker from one exchange. `volume_24h` is quote-denominated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerData {
    pub t: i64,
    pub price: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub volume_24h: f64,
}

/// Open interest sample: USD notional per exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OiPoint {
    pub t: i64,
    pub oi_usd: HashMap<String, f64>,
}

impl OiPoint {
    pub fn total(&self) -> f64 {
        self.oi_usd.values().filter(|v| **v > 0.0).sum()
    }
}

/// Funding rate sample per exchange (decimal, e.g. -0.0001 = -0.01%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingPoint {
    pub t: i64,
    pub rate: HashMap<String, f64>,
}

impl FundingPoint {
    pub fn mean(&self) -> Option<f64> {
        if self.rate.is_empty() {
            return None;
        }
        Some(self.rate.values().sum::<f64>() / self.rate.len() as f64)
    }
}

/// Long/short account ratio sample per exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsPoint {
    pub t: i64,
    pub ratio: HashMap<String, f64>,
}

impl LsPoint {
    pub fn mean(&self) -> Option<f64> {
        if self.ratio.is_empty() {
            return None;
        }
        Some(self.ratio.values().sum::<f64>() / self.ratio.len() as f64)
    }
}

/// Reduced per-exchange ticker kept inside a persisted snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExchangeTicker {
    pub price: f64,
    pub vol24: f64,
}

/// Persisted ticker snapshot aggregated across exchanges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerSnap {
    pub t: i64,
    pub price: f64,
    pub vol24: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub per_exchange: HashMap<String, ExchangeTicker>,
}

/// Kinds of persisted sample series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Candle,
    OpenInterest,
    Funding,
    LongShort,
    Ticker,
}

impl SeriesKind {
    pub const ALL: [SeriesKind; 5] = [
        SeriesKind::Candle,
        SeriesKind::OpenInterest,
        SeriesKind::Funding,
        SeriesKind::LongShort,
        SeriesKind::Ticker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Candle => "candle",
            SeriesKind::OpenInterest => "open_interest",
            SeriesKind::Funding => "funding",
            SeriesKind::LongShort => "long_short",
            SeriesKind::Ticker => "ticker",
        }
    }

    /// Retention cap enforced by the store, slightly above the minimum
    /// each consumer requires.
    pub fn cap(&self) -> usize {
        match self {
            SeriesKind::Candle => 600,
            SeriesKind::OpenInterest => 240,
            SeriesKind::Funding => 120,
            SeriesKind::LongShort => 120,
            SeriesKind::Ticker => 600,
        }
    }
}

impl std::fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything collected for one symbol in one scan pass: live fetches plus
/// the historical ranges the evaluators look back over. Signal and feature
/// code reads this bundle and never touches the store or the network.
#[derive(Debug, Clone, Default)]
pub struct SymbolData {
    pub symbol: String,
    pub t: i64,
    /// Hourly candles, ascending, from the exchange with the deepest history.
    pub candles: Vec<Candle>,
    /// Live tickers per exchange.
    pub tickers: HashMap<String, TickerData>,
    /// Live open interest (USD) per exchange.
    pub oi_now: HashMap<String, f64>,
    /// Live funding rate per exchange.
    pub funding_now: HashMap<String, f64>,
    /// Live long/short ratio per exchange.
    pub ls_now: HashMap<String, f64>,
    /// Latest order books per exchange.
    pub books: HashMap<String, OrderBook>,
    /// Stored OI history (last ~72h and older, ascending).
    pub oi_history: Vec<OiPoint>,
    /// Stored funding history (last ~72h, ascending).
    pub funding_history: Vec<FundingPoint>,
    /// Stored long/short history (last ~72h, ascending).
    pub ls_history: Vec<LsPoint>,
    /// Stored ticker snapshots (last ~7d, ascending).
    pub ticker_history: Vec<TickerSnap>,
    /// Collection-level quality: degraded by failed fetches and gaps.
    pub quality: Option<Quality>,
}

impl SymbolData {
    /// Best current price: any live ticker first, last candle close second.
    pub fn price(&self) -> Option<f64> {
        self.tickers
            .values()
            .map(|t| t.price)
            .find(|p| *p > 0.0)
            .or_else(|| self.candles.last().map(|c| c.close).filter(|p| *p > 0.0))
    }

    /// Close price `hours` ago, from candles when deep enough, otherwise the
    /// oldest stored ticker inside the window.
    pub fn price_hours_ago(&self, hours: usize) -> Option<f64> {
        if self.candles.len() > hours {
            let c = &self.candles[self.candles.len() - 1 - hours];
            if c.close > 0.0 {
                return Some(c.close);
            }
        }
        let cutoff = self.t - (hours as i64) * 3_600_000;
        self.ticker_history
            .iter()
            .find(|s| s.t >= cutoff && s.price > 0.0)
            .map(|s| s.price)
    }

    /// Fractional return over the last `hours` (0.05 = +5%).
    pub fn price_return(&self, hours: usize) -> Option<f64> {
        let now = self.price()?;
        let old = self.price_hours_ago(hours)?;
        if old <= 0.0 {
            return None;
        }
        Some(now / old - 1.0)
    }

    /// Total live open interest across exchanges, USD.
    pub fn total_oi(&self) -> f64 {
        self.oi_now.values().filter(|v| **v > 0.0).sum()
    }

    /// Mean live funding rate across exchanges.
    pub fn mean_funding(&self) -> Option<f64> {
        if self.funding_now.is_empty() {
            return None;
        }
        Some(self.funding_now.values().sum::<f64>() / self.funding_now.len() as f64)
    }

    /// Mean live long/short ratio across exchanges.
    pub fn mean_ls(&self) -> Option<f64> {
        if self.ls_now.is_empty() {
            return None;
        }
        Some(self.ls_now.values().sum::<f64>() / self.ls_now.len() as f64)
    }

    /// All books merged into one: bids descending, asks ascending by price.
    pub fn merged_book(&self) -> OrderBook {
        let mut bids: Vec<BookLevel> = Vec::new();
        let mut asks: Vec<BookLevel> = Vec::new();
        let mut t = 0;
        for book in self.books.values() {
            bids.extend_from_slice(&book.bids);
            asks.extend_from_slice(&book.asks);
            t = t.max(book.t);
        }
        bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
        asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
        OrderBook { t, bids, asks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_min() {
        assert_eq!(Quality::High.min(Quality::Low), Quality::Low);
        assert_eq!(Quality::High.min(Quality::Med), Quality::Med);
        assert_eq!(Quality::Med.min(Quality::High), Quality::Med);
        assert_eq!(Quality::High.min(Quality::High), Quality::High);
    }

    #[test]
    fn test_series_kind_caps_cover_minimums() {
        assert!(SeriesKind::Candle.cap() >= 500);
        assert!(SeriesKind::OpenInterest.cap() >= 200);
        assert!(SeriesKind::Funding.cap() >= 100);
        assert!(SeriesKind::LongShort.cap() >= 100);
        assert!(SeriesKind::Ticker.cap() >= 500);
    }

    #[test]
    fn test_price_prefers_ticker() {
        let mut data = SymbolData::default();
        data.candles.push(Candle {
            t: 0,
            open: 1.0,
            high: 1.1,
            low: 0.9,
            close: 1.05,
            volume: 10.0,
        });
        assert_eq!(data.price(), Some(1.05));

        data.tickers.insert(
            "binance".into(),
            TickerData {
                t: 0,
                price: 1.10,
                bid: None,
                ask: None,
                volume_24h: 0.0,
            },
        );
        assert_eq!(data.price(), Some(1.10));
    }

    #[test]
    fn test_merged_book_ordering() {
        let mut data = SymbolData::default();
        data.books.insert(
            "a".into(),
            OrderBook {
                t: 1,
                bids: vec![BookLevel { price: 0.99, amount: 1.0 }],
                asks: vec![BookLevel { price: 1.02, amount: 1.0 }],
            },
        );
        data.books.insert(
            "b".into(),
            OrderBook {
                t: 2,
                bids: vec![BookLevel { price: 0.995, amount: 1.0 }],
                asks: vec![BookLevel { price: 1.01, amount: 1.0 }],
            },
        );
        let merged = data.merged_book();
        assert_eq!(merged.bids[0].price, 0.995);
        assert_eq!(merged.asks[0].price, 1.01);
        assert_eq!(merged.t, 2);
    }
}
