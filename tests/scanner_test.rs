//! Full-pipeline smoke tests: a scripted venue feeds the scheduler, which
//! bootstraps, scores, derives levels and dispatches alerts end to end.

use async_trait::async_trait;
use prowl::alerts::Alerter;
use prowl::config::{Config, ExchangeConfig};
use prowl::error::Result;
use prowl::services::{Scanner, Store};
use prowl::sources::{MarketSource, SourceRegistry};
use prowl::types::{
    Alert, BookLevel, Candle, Classification, OrderBook, TickerData, TradeNotice,
};
use std::sync::{Arc, Mutex};

/// A venue scripted to look like a textbook short-crowded accumulation:
/// OI up 25% over 72h, deeply negative persistent funding, shorts dominant,
/// bid-heavy book, thin ask resistance.
struct SqueezeVenue {
    now: i64,
}

impl SqueezeVenue {
    fn new() -> Arc<Self> {
        let now = chrono::Utc::now().timestamp_millis();
        Arc::new(Self { now: now - now.rem_euclid(3_600_000) })
    }

    fn candles(&self, count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let t = self.now - ((count - 1 - i) as i64) * 3_600_000;
                Candle { t, open: 1.0, high: 1.01, low: 0.99, close: 1.0, volume: 50_000.0 }
            })
            .collect()
    }
}

#[async_trait]
impl MarketSource for SqueezeVenue {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn list_futures_symbols(&self) -> Result<Vec<String>> {
        Ok(vec!["WIF".into()])
    }

    async fn fetch_candles(&self, _symbol: &str, limit: usize) -> Result<Vec<Candle>> {
        Ok(self.candles(limit.min(200)))
    }

    async fn fetch_ticker(&self, _symbol: &str) -> Result<TickerData> {
        Ok(TickerData {
            t: self.now,
            price: 1.0,
            bid: Some(0.999),
            ask: Some(1.001),
            volume_24h: 5_000_000.0,
        })
    }

    async fn fetch_open_interest(&self, _symbol: &str) -> Result<f64> {
        Ok(10_000_000.0)
    }

    async fn fetch_funding_rate(&self, _symbol: &str) -> Result<f64> {
        Ok(-0.0002)
    }

    async fn fetch_order_book(&self, _symbol: &str, _depth: usize) -> Result<OrderBook> {
        let bids = (1..=25)
            .map(|i| BookLevel { price: 1.0 - i as f64 * 0.004, amount: 80_000.0 })
            .collect();
        let asks = (1..=25)
            .map(|i| BookLevel { price: 1.0 + i as f64 * 0.004, amount: 40_000.0 })
            .collect();
        Ok(OrderBook { t: self.now, bids, asks })
    }

    async fn fetch_ls_ratio(&self, _symbol: &str) -> Result<f64> {
        Ok(0.7)
    }

    async fn fetch_oi_history(&self, _symbol: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        // Ramp from 8M to 10M over the window.
        Ok((0..limit)
            .map(|i| {
                let t = self.now - ((limit - 1 - i) as i64) * 3_600_000;
                let frac = i as f64 / (limit.max(2) - 1) as f64;
                (t, 8_000_000.0 + 2_000_000.0 * frac)
            })
            .collect())
    }

    async fn fetch_funding_history(&self, _symbol: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        Ok((0..limit)
            .map(|i| (self.now - ((limit - 1 - i) as i64) * 3_600_000, -0.0002))
            .collect())
    }

    async fn fetch_ls_history(&self, _symbol: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        Ok((0..limit)
            .map(|i| (self.now - ((limit - 1 - i) as i64) * 3_600_000, 0.7))
            .collect())
    }
}

#[derive(Default)]
struct Collector {
    alerts: Mutex<Vec<Alert>>,
}

#[async_trait]
impl Alerter for Collector {
    fn name(&self) -> &'static str {
        "collector"
    }

    async fn send_scan_alert(&self, alert: &Alert) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn send_trade_notice(&self, _notice: &TradeNotice) -> Result<()> {
        Ok(())
    }

    async fn send_text(&self, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn send_operator(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.exchanges = vec![ExchangeConfig {
        name: "scripted".into(),
        api_key: None,
        api_secret: None,
        enabled: true,
    }];
    config
}

#[tokio::test]
async fn full_cycle_bootstraps_scores_and_alerts() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let registry = Arc::new(SourceRegistry::from_sources(vec![SqueezeVenue::new()]));
    let collector = Arc::new(Collector::default());
    let scanner = Scanner::new(
        config(),
        store.clone(),
        registry,
        vec![collector.clone() as Arc<dyn Alerter>],
    );

    let summary = scanner.clone().run_cycle().await.unwrap();
    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.errors, 0);

    // The squeeze venue must register as at least a watchlist candidate.
    let result = scanner.latest_result("WIF").expect("scan result recorded");
    assert!(result.final_score >= 48.0, "score {}", result.final_score);
    assert!(result.classification >= Classification::Watchlist);
    assert!(result.bonuses_applied.iter().any(|b| b == "cascade_setup"));
    assert!(result.levels.is_some(), "levels attached for alerted class");

    // One alert dispatched, carrying the same classification.
    let alerts = collector.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].result.classification, result.classification);

    // Bootstrap landed deep history in the store.
    assert!(store.count("WIF", prowl::types::SeriesKind::OpenInterest).unwrap() >= 150);
    assert!(store.count("WIF", prowl::types::SeriesKind::Funding).unwrap() >= 90);
}

#[tokio::test]
async fn second_cycle_reuses_bootstrap_and_stays_stable() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let registry = Arc::new(SourceRegistry::from_sources(vec![SqueezeVenue::new()]));
    let collector = Arc::new(Collector::default());
    let scanner = Scanner::new(
        config(),
        store.clone(),
        registry,
        vec![collector.clone() as Arc<dyn Alerter>],
    );

    scanner.clone().run_cycle().await.unwrap();
    let first = scanner.latest_result("WIF").unwrap();
    // Distinct scan timestamps keep both results addressable.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    scanner.clone().run_cycle().await.unwrap();
    let second = scanner.latest_result("WIF").unwrap();

    // Identical market in, near-identical score out, and no jump events.
    assert!((first.final_score - second.final_score).abs() < 15.0);
    let alerts = collector.alerts.lock().unwrap();
    for alert in alerts.iter() {
        assert!(alert.events.is_empty(), "no events on a flat market");
    }

    // Two results retained for the symbol.
    assert_eq!(store.last_scans("WIF", 2).unwrap().len(), 2);
}
