//! Binance USDⓈ-M futures adapter.

use crate::error::{Result, ScanError};
use crate::sources::{parse_f64, with_retry, MarketSource, TokenBucket};
use crate::types::{BookLevel, Candle, OrderBook, TickerData};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

const BASE_URL: &str = "https://fapi.binance.com";

/// Shared-bucket sizing: fapi allows 2400 request-weight/min; a 10/s refill
/// with a small burst keeps the whole scanner well under that.
const BUCKET_CAPACITY: u32 = 20;
const BUCKET_REFILL_PER_SEC: f64 = 10.0;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    status: String,
    contract_type: String,
    base_asset: String,
    quote_asset: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    quote_volume: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTicker {
    bid_price: String,
    ask_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndex {
    mark_price: String,
    last_funding_rate: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenInterest {
    open_interest: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OiHistEntry {
    sum_open_interest_value: String,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundingHistEntry {
    funding_rate: String,
    funding_time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LsRatioEntry {
    long_short_ratio: String,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct Depth {
    bids: Vec<(String, String)>,
    asks: Vec<(String, String)>,
}

/// Binance USDⓈ-M futures REST client.
pub struct BinanceSource {
    client: Client,
    api_key: Option<String>,
    bucket: TokenBucket,
}

impl BinanceSource {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            bucket: TokenBucket::new(BUCKET_CAPACITY, BUCKET_REFILL_PER_SEC),
        }
    }

    fn pair(symbol: &str) -> String {
        format!("{}USDT", symbol.to_uppercase())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.bucket.acquire().await;
        let url = format!("{}{}", BASE_URL, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(ref key) = self.api_key {
            request = request.header("X-MBX-APIKEY", key);
        }
        let response = request.send().await.map_err(ScanError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::from_status(status, path));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ScanError::PermanentFetch(format!("{}: {}", path, e)))
    }
}

/// One kline row is a mixed-type JSON array:
/// `[openTime, "o", "h", "l", "c", "v", closeTime, "quoteVolume", ...]`.
fn parse_kline(row: &[Value]) -> Result<Candle> {
    let field = |i: usize| -> Result<f64> {
        row.get(i)
            .and_then(Value::as_str)
            .ok_or_else(|| ScanError::PermanentFetch(format!("kline field {} missing", i)))
            .and_then(|s| parse_f64(s, "kline"))
    };
    let t = row
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| ScanError::PermanentFetch("kline open time missing".into()))?;
    Ok(Candle {
        t,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        // Quote volume keeps cross-exchange comparisons in USD terms.
        volume: field(7)?,
    })
}

#[async_trait]
impl MarketSource for BinanceSource {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn list_futures_symbols(&self) -> Result<Vec<String>> {
        let info: ExchangeInfo = with_retry("binance exchangeInfo", || {
            self.get_json("/fapi/v1/exchangeInfo", &[])
        })
        .await?;
        Ok(info
            .symbols
            .into_iter()
            .filter(|s| {
                s.status == "TRADING" && s.contract_type == "PERPETUAL" && s.quote_asset == "USDT"
            })
            .map(|s| s.base_asset)
            .collect())
    }

    async fn fetch_candles(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>> {
        let query = [
            ("symbol", Self::pair(symbol)),
            ("interval", "1h".to_string()),
            ("limit", limit.to_string()),
        ];
        let rows: Vec<Vec<Value>> =
            with_retry("binance klines", || self.get_json("/fapi/v1/klines", &query)).await?;
        rows.iter().map(|row| parse_kline(row)).collect()
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<TickerData> {
        let query = [("symbol", Self::pair(symbol))];
        let ticker: Ticker24h = with_retry("binance ticker", || {
            self.get_json("/fapi/v1/ticker/24hr", &query)
        })
        .await?;
        let book: BookTicker = with_retry("binance bookTicker", || {
            self.get_json("/fapi/v1/ticker/bookTicker", &query)
        })
        .await?;
        Ok(TickerData {
            t: chrono::Utc::now().timestamp_millis(),
            price: parse_f64(&ticker.last_price, "lastPrice")?,
            bid: parse_f64(&book.bid_price, "bidPrice").ok(),
            ask: parse_f64(&book.ask_price, "askPrice").ok(),
            volume_24h: parse_f64(&ticker.quote_volume, "quoteVolume")?,
        })
    }

    async fn fetch_open_interest(&self, symbol: &str) -> Result<f64> {
        let query = [("symbol", Self::pair(symbol))];
        // openInterest reports base units; premiumIndex mark price converts
        // it to USD notional.
        let (oi, premium) = with_retry("binance openInterest", || async {
            let oi: OpenInterest = self.get_json("/fapi/v1/openInterest", &query).await?;
            let premium: PremiumIndex = self.get_json("/fapi/v1/premiumIndex", &query).await?;
            Ok((oi, premium))
        })
        .await?;
        let amount = parse_f64(&oi.open_interest, "openInterest")?;
        let mark = parse_f64(&premium.mark_price, "markPrice")?;
        if amount <= 0.0 || mark <= 0.0 {
            return Err(ScanError::PermanentFetch(format!(
                "binance reports no open interest for {}",
                symbol
            )));
        }
        Ok(amount * mark)
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<f64> {
        let query = [("symbol", Self::pair(symbol))];
        let premium: PremiumIndex = with_retry("binance premiumIndex", || {
            self.get_json("/fapi/v1/premiumIndex", &query)
        })
        .await?;
        parse_f64(&premium.last_funding_rate, "lastFundingRate")
    }

    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook> {
        let query = [("symbol", Self::pair(symbol)), ("limit", depth.to_string())];
        let book: Depth =
            with_retry("binance depth", || self.get_json("/fapi/v1/depth", &query)).await?;
        let parse_side = |levels: Vec<(String, String)>| -> Result<Vec<BookLevel>> {
            levels
                .into_iter()
                .map(|(p, q)| {
                    Ok(BookLevel {
                        price: parse_f64(&p, "depth price")?,
                        amount: parse_f64(&q, "depth qty")?,
                    })
                })
                .collect()
        };
        Ok(OrderBook {
            t: chrono::Utc::now().timestamp_millis(),
            bids: parse_side(book.bids)?,
            asks: parse_side(book.asks)?,
        })
    }

    async fn fetch_ls_ratio(&self, symbol: &str) -> Result<f64> {
        let entries = self.fetch_ls_history(symbol, 1).await?;
        entries
            .last()
            .map(|(_, ratio)| *ratio)
            .ok_or_else(|| ScanError::PermanentFetch(format!("no L/S ratio for {}", symbol)))
    }

    async fn fetch_oi_history(&self, symbol: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        let query = [
            ("symbol", Self::pair(symbol)),
            ("period", "1h".to_string()),
            ("limit", limit.to_string()),
        ];
        let entries: Vec<OiHistEntry> = with_retry("binance openInterestHist", || {
            self.get_json("/futures/data/openInterestHist", &query)
        })
        .await?;
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            let usd = parse_f64(&e.sum_open_interest_value, "sumOpenInterestValue")?;
            if usd > 0.0 {
                out.push((e.timestamp, usd));
            }
        }
        out.sort_by_key(|(t, _)| *t);
        Ok(out)
    }

    async fn fetch_funding_history(&self, symbol: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        let query = [("symbol", Self::pair(symbol)), ("limit", limit.to_string())];
        let entries: Vec<FundingHistEntry> = with_retry("binance fundingRate", || {
            self.get_json("/fapi/v1/fundingRate", &query)
        })
        .await?;
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            out.push((e.funding_time, parse_f64(&e.funding_rate, "fundingRate")?));
        }
        out.sort_by_key(|(t, _)| *t);
        Ok(out)
    }

    async fn fetch_ls_history(&self, symbol: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        let query = [
            ("symbol", Self::pair(symbol)),
            ("period", "1h".to_string()),
            ("limit", limit.to_string()),
        ];
        let entries: Vec<LsRatioEntry> = with_retry("binance longShortRatio", || {
            self.get_json("/futures/data/globalLongShortAccountRatio", &query)
        })
        .await?;
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            out.push((e.timestamp, parse_f64(&e.long_short_ratio, "longShortRatio")?));
        }
        out.sort_by_key(|(t, _)| *t);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_formatting() {
        assert_eq!(BinanceSource::pair("wif"), "WIFUSDT");
        assert_eq!(BinanceSource::pair("BTC"), "BTCUSDT");
    }

    #[test]
    fn test_parse_kline_row() {
        let json = r#"[1700000000000, "2.4", "2.5", "2.3", "2.45", "120000", 1700003599999,
                       "294000.5", 850, "60000", "147000.1", "0"]"#;
        let row: Vec<Value> = serde_json::from_str(json).unwrap();
        let candle = parse_kline(&row).unwrap();
        assert_eq!(candle.t, 1700000000000);
        assert_eq!(candle.open, 2.4);
        assert_eq!(candle.close, 2.45);
        // Volume is the quote-denominated column.
        assert_eq!(candle.volume, 294000.5);
    }

    #[test]
    fn test_parse_kline_rejects_short_row() {
        let row: Vec<Value> = serde_json::from_str(r#"[1700000000000, "2.4"]"#).unwrap();
        assert!(parse_kline(&row).is_err());
    }

    #[test]
    fn test_ticker_deserialization() {
        let json = r#"{"symbol": "WIFUSDT", "lastPrice": "2.41", "quoteVolume": "1234567.8",
                       "priceChangePercent": "3.1"}"#;
        let ticker: Ticker24h = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.last_price, "2.41");
        assert_eq!(ticker.quote_volume, "1234567.8");
    }

    #[test]
    fn test_oi_hist_deserialization() {
        let json = r#"[{"symbol": "WIFUSDT", "sumOpenInterest": "1000000",
                        "sumOpenInterestValue": "2410000.55", "timestamp": 1700000000000}]"#;
        let entries: Vec<OiHistEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].timestamp, 1700000000000);
        assert_eq!(entries[0].sum_open_interest_value, "2410000.55");
    }
}
