//! Bybit v5 linear-perpetuals adapter.

use crate::error::{Result, ScanError};
use crate::sources::{parse_f64, with_retry, MarketSource, TokenBucket};
use crate::types::{BookLevel, Candle, OrderBook, TickerData};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

const BASE_URL: &str = "https://api.bybit.com";

/// Bybit market endpoints allow 10 req/s per IP; stay just under.
const BUCKET_CAPACITY: u32 = 10;
const BUCKET_REFILL_PER_SEC: f64 = 8.0;

/// Rate-limit breach (retryable), per the v5 error code table.
const RET_CODE_RATE_LIMITED: i64 = 10006;

/// Every v5 response wraps its payload in this envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    ret_code: i64,
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentInfo {
    status: String,
    contract_type: String,
    base_coin: String,
    quote_coin: String,
}

/// Kline rows arrive as string arrays:
/// `["startTime", "open", "high", "low", "close", "volume", "turnover"]`.
type KlineRow = Vec<String>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerEntry {
    last_price: String,
    bid1_price: String,
    ask1_price: String,
    turnover24h: String,
    open_interest_value: String,
    funding_rate: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderBookResult {
    b: Vec<(String, String)>,
    a: Vec<(String, String)>,
    ts: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OiEntry {
    open_interest: String,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundingEntry {
    funding_rate: String,
    funding_rate_timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountRatioEntry {
    buy_ratio: String,
    sell_ratio: String,
    timestamp: String,
}

/// Bybit v5 REST client (linear category).
pub struct BybitSource {
    client: Client,
    #[allow(dead_code)]
    api_key: Option<String>,
    bucket: TokenBucket,
}

impl BybitSource {
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

    async fn get_result<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.bucket.acquire().await;
        let url = format!("{}{}", BASE_URL, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(ScanError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::from_status(status, path));
        }
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ScanError::PermanentFetch(format!("{}: {}", path, e)))?;
        if envelope.ret_code == RET_CODE_RATE_LIMITED {
            return Err(ScanError::TransientFetch(format!(
                "{}: rate limited ({})",
                path, envelope.ret_msg
            )));
        }
        if envelope.ret_code != 0 {
            return Err(ScanError::PermanentFetch(format!(
                "{}: retCode {} ({})",
                path, envelope.ret_code, envelope.ret_msg
            )));
        }
        envelope
            .result
            .ok_or_else(|| ScanError::PermanentFetch(format!("{}: empty result", path)))
    }

    async fn ticker_entry(&self, symbol: &str) -> Result<TickerEntry> {
        let query = [
            ("category", "linear".to_string()),
            ("symbol", Self::pair(symbol)),
        ];
        let result: ListResult<TickerEntry> = with_retry("bybit tickers", || {
            self.get_result("/v5/market/tickers", &query)
        })
        .await?;
        result
            .list
            .into_iter()
            .next()
            .ok_or_else(|| ScanError::PermanentFetch(format!("bybit has no ticker for {}", symbol)))
    }

    fn parse_millis(raw: &str, context: &str) -> Result<i64> {
        raw.parse::<i64>()
            .map_err(|_| ScanError::PermanentFetch(format!("{}: bad timestamp {:?}", context, raw)))
    }
}

#[async_trait]
impl MarketSource for BybitSource {
    fn name(&self) -> &'static str {
        "bybit"
    }

    async fn list_futures_symbols(&self) -> Result<Vec<String>> {
        let query = [
            ("category", "linear".to_string()),
            ("limit", "1000".to_string()),
        ];
        let result: ListResult<InstrumentInfo> = with_retry("bybit instruments", || {
            self.get_result("/v5/market/instruments-info", &query)
        })
        .await?;
        Ok(result
            .list
            .into_iter()
            .filter(|i| {
                i.status == "Trading"
                    && i.contract_type == "LinearPerpetual"
                    && i.quote_coin == "USDT"
            })
            .map(|i| i.base_coin)
            .collect())
    }

    async fn fetch_candles(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>> {
        let query = [
            ("category", "linear".to_string()),
            ("symbol", Self::pair(symbol)),
            ("interval", "60".to_string()),
            ("limit", limit.to_string()),
        ];
        let result: ListResult<KlineRow> =
            with_retry("bybit kline", || self.get_result("/v5/market/kline", &query)).await?;
        let mut candles = Vec::with_capacity(result.list.len());
        for row in &result.list {
            if row.len() < 7 {
                return Err(ScanError::PermanentFetch("bybit kline row too short".into()));
            }
            candles.push(Candle {
                t: Self::parse_millis(&row[0], "kline start")?,
                open: parse_f64(&row[1], "kline open")?,
                high: parse_f64(&row[2], "kline high")?,
                low: parse_f64(&row[3], "kline low")?,
                close: parse_f64(&row[4], "kline close")?,
                // Turnover keeps volume quote-denominated like the rest of
                // the pipeline expects.
                volume: parse_f64(&row[6], "kline turnover")?,
            });
        }
        // v5 returns newest first.
        candles.sort_by_key(|c| c.t);
        Ok(candles)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<TickerData> {
        let entry = self.ticker_entry(symbol).await?;
        Ok(TickerData {
            t: chrono::Utc::now().timestamp_millis(),
            price: parse_f64(&entry.last_price, "lastPrice")?,
            bid: parse_f64(&entry.bid1_price, "bid1Price").ok(),
            ask: parse_f64(&entry.ask1_price, "ask1Price").ok(),
            volume_24h: parse_f64(&entry.turnover24h, "turnover24h")?,
        })
    }

    async fn fetch_open_interest(&self, symbol: &str) -> Result<f64> {
        let entry = self.ticker_entry(symbol).await?;
        let value = parse_f64(&entry.open_interest_value, "openInterestValue")?;
        if value <= 0.0 {
            return Err(ScanError::PermanentFetch(format!(
                "bybit reports no open interest for {}",
                symbol
            )));
        }
        Ok(value)
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<f64> {
        let entry = self.ticker_entry(symbol).await?;
        parse_f64(&entry.funding_rate, "fundingRate")
    }

    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook> {
        let query = [
            ("category", "linear".to_string()),
            ("symbol", Self::pair(symbol)),
            ("limit", depth.to_string()),
        ];
        let result: OrderBookResult = with_retry("bybit orderbook", || {
            self.get_result("/v5/market/orderbook", &query)
        })
        .await?;
        let parse_side = |levels: Vec<(String, String)>| -> Result<Vec<BookLevel>> {
            levels
                .into_iter()
                .map(|(p, q)| {
                    Ok(BookLevel {
                        price: parse_f64(&p, "book price")?,
                        amount: parse_f64(&q, "book qty")?,
                    })
                })
                .collect()
        };
        Ok(OrderBook {
            t: result.ts,
            bids: parse_side(result.b)?,
            asks: parse_side(result.a)?,
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
        // open-interest history reports base units; scale by the current
        // price to keep the series USD-denominated like Binance's.
        let price = parse_f64(&self.ticker_entry(symbol).await?.last_price, "lastPrice")?;
        if price <= 0.0 {
            return Err(ScanError::PermanentFetch(format!("no price for {}", symbol)));
        }
        let query = [
            ("category", "linear".to_string()),
            ("symbol", Self::pair(symbol)),
            ("intervalTime", "1h".to_string()),
            ("limit", limit.to_string()),
        ];
        let result: ListResult<OiEntry> = with_retry("bybit open-interest", || {
            self.get_result("/v5/market/open-interest", &query)
        })
        .await?;
        let mut out = Vec::with_capacity(result.list.len());
        for e in result.list {
            let base = parse_f64(&e.open_interest, "openInterest")?;
            if base > 0.0 {
                out.push((Self::parse_millis(&e.timestamp, "oi timestamp")?, base * price));
            }
        }
        out.sort_by_key(|(t, _)| *t);
        Ok(out)
    }

    async fn fetch_funding_history(&self, symbol: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        let query = [
            ("category", "linear".to_string()),
            ("symbol", Self::pair(symbol)),
            ("limit", limit.to_string()),
        ];
        let result: ListResult<FundingEntry> = with_retry("bybit funding history", || {
            self.get_result("/v5/market/funding/history", &query)
        })
        .await?;
        let mut out = Vec::with_capacity(result.list.len());
        for e in result.list {
            out.push((
                Self::parse_millis(&e.funding_rate_timestamp, "funding timestamp")?,
                parse_f64(&e.funding_rate, "fundingRate")?,
            ));
        }
        out.sort_by_key(|(t, _)| *t);
        Ok(out)
    }

    async fn fetch_ls_history(&self, symbol: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        let query = [
            ("category", "linear".to_string()),
            ("symbol", Self::pair(symbol)),
            ("period", "1h".to_string()),
            ("limit", limit.to_string()),
        ];
        let result: ListResult<AccountRatioEntry> = with_retry("bybit account-ratio", || {
            self.get_result("/v5/market/account-ratio", &query)
        })
        .await?;
        let mut out = Vec::with_capacity(result.list.len());
        for e in result.list {
            let buy = parse_f64(&e.buy_ratio, "buyRatio")?;
            let sell = parse_f64(&e.sell_ratio, "sellRatio")?;
            if sell > 0.0 {
                out.push((Self::parse_millis(&e.timestamp, "ratio timestamp")?, buy / sell));
            }
        }
        out.sort_by_key(|(t, _)| *t);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_error_codes() {
        let json = r#"{"retCode": 10001, "retMsg": "params error", "result": null}"#;
        let envelope: Envelope<ListResult<TickerEntry>> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.ret_code, 10001);
        assert!(envelope.result.is_none());
    }

    #[test]
    fn test_ticker_entry_deserialization() {
        let json = r#"{
            "symbol": "WIFUSDT",
            "lastPrice": "2.41",
            "bid1Price": "2.409",
            "ask1Price": "2.411",
            "turnover24h": "9876543.21",
            "openInterestValue": "4500000.0",
            "fundingRate": "-0.00012"
        }"#;
        let entry: TickerEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.last_price, "2.41");
        assert_eq!(entry.funding_rate, "-0.00012");
    }

    #[test]
    fn test_account_ratio_to_ls() {
        let json = r#"{"buyRatio": "0.45", "sellRatio": "0.55", "timestamp": "1700000000000"}"#;
        let entry: AccountRatioEntry = serde_json::from_str(json).unwrap();
        let buy: f64 = entry.buy_ratio.parse().unwrap();
        let sell: f64 = entry.sell_ratio.parse().unwrap();
        assert!((buy / sell - 0.8181).abs() < 1e-3);
    }

    #[test]
    fn test_pair_formatting() {
        assert_eq!(BybitSource::pair("wif"), "WIFUSDT");
    }
}
