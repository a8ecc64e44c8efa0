//! Smart-levels scenarios: stop candidate selection, cascade-stretched
//! take-profits, and the level invariants.

use prowl::config::RiskConfig;
use prowl::services::LevelsEngine;
use prowl::types::{
    BookLevel, Candle, Classification, OrderBook, Quality, ScanResult, Signal, SignalKind,
    StopMethod, SymbolData, TickerData,
};

fn candle(t: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle { t, open, high, low, close, volume: 1000.0 }
}

/// 48 hourly candles with every true range exactly 0.02 (so ATR(14) is
/// exactly 0.020), dipping to a 0.955 swing low in the last day.
fn market() -> SymbolData {
    let mut data = SymbolData::default();
    data.t = 100 * 3_600_000;
    let hour = 3_600_000;
    for i in 0..43i64 {
        data.candles.push(candle(i * hour, 1.0, 1.01, 0.99, 1.0));
    }
    let t = |i: i64| (43 + i) * hour;
    data.candles.push(candle(t(0), 1.0, 1.0, 0.98, 0.98));
    data.candles.push(candle(t(1), 0.98, 0.98, 0.96, 0.96));
    data.candles.push(candle(t(2), 0.96, 0.975, 0.955, 0.97));
    data.candles.push(candle(t(3), 0.97, 0.99, 0.97, 0.99));
    data.candles.push(candle(t(4), 0.99, 1.0, 0.98, 1.0));
    data.tickers.insert(
        "binance".into(),
        TickerData { t: data.t, price: 1.0, bid: None, ask: None, volume_24h: 0.0 },
    );
    data
}

fn scored(classification: Classification, cascade_ratio: f64) -> ScanResult {
    ScanResult {
        symbol: "WIF".into(),
        t: 0,
        base_score: 70.0,
        final_score: 80.0,
        classification,
        signals: vec![Signal::new(
            SignalKind::LiquidationLeverage,
            60.0,
            cascade_ratio,
            Quality::High,
        )],
        bonuses_applied: Vec::new(),
        penalty_applied: false,
        levels: None,
        quality: Quality::High,
    }
}

fn engine() -> LevelsEngine {
    LevelsEngine::new(RiskConfig::default())
}

#[test]
fn stop_selection_takes_deepest_qualified_candidate() {
    let mut data = market();
    data.books.insert(
        "binance".into(),
        OrderBook {
            t: 0,
            bids: vec![
                BookLevel { price: 0.97, amount: 50_000.0 },
                BookLevel { price: 0.93, amount: 120.0 },
            ],
            asks: vec![BookLevel { price: 1.05, amount: 100.0 }],
        },
    );
    let levels = engine().compute(&data, &scored(Classification::Critical, 1.0)).unwrap();

    // ATR candidate 0.960, swing 0.950, book-support 0.968: all at least
    // one ATR below price, the swing stop is the deepest.
    assert_eq!(levels.stop.method, StopMethod::SwingLow);
    assert!((levels.stop.price - 0.950).abs() < 1e-9);
    assert!((levels.stop.pct - 0.05).abs() < 1e-9);
}

#[test]
fn stop_honours_bounds_and_atr_distance() {
    for cascade in [1.0, 6.0] {
        let data = market();
        let levels = engine().compute(&data, &scored(Classification::Critical, cascade)).unwrap();
        assert!(levels.stop.pct >= 0.025 - 1e-12);
        assert!(levels.stop.pct <= 0.15 + 1e-12);
        assert!(levels.price - levels.stop.price >= levels.atr - 1e-12);
    }
}

#[test]
fn cascade_ratio_five_stretches_take_profits() {
    let data = market();
    let levels = engine().compute(&data, &scored(Classification::Critical, 5.0)).unwrap();

    // k = 1 + 0.1 * (5 - 3) = 1.2 over ATR multiples [3.0, 5.5, 9.0].
    assert!((levels.take_profits[0].price - 1.072).abs() < 1e-9);
    assert!((levels.take_profits[1].price - 1.132).abs() < 1e-9);
    assert!((levels.take_profits[2].price - 1.216).abs() < 1e-9);
    assert!((levels.trail_pct - 0.04).abs() < 1e-9);
}

#[test]
fn take_profits_stay_ordered() {
    for cascade in [0.5, 3.0, 5.0, 12.0] {
        let data = market();
        let levels = engine().compute(&data, &scored(Classification::HighAlert, cascade)).unwrap();
        let tp = &levels.take_profits;
        assert!(levels.price < tp[0].price);
        assert!(tp[0].price < tp[1].price);
        assert!(tp[1].price < tp[2].price);
    }
}

#[test]
fn cascade_multiplier_clamps() {
    let data = market();
    // Very high cascade ratio: k caps at 1.8.
    let levels = engine().compute(&data, &scored(Classification::Critical, 50.0)).unwrap();
    assert!((levels.take_profits[0].price - (1.0 + 3.0 * 1.8 * 0.02)).abs() < 1e-9);

    // Low ratio: k floors at 1.0.
    let levels = engine().compute(&data, &scored(Classification::Critical, 0.1)).unwrap();
    assert!((levels.take_profits[0].price - 1.060).abs() < 1e-9);
}

#[test]
fn watchlist_entry_sits_on_swing_low() {
    let data = market();
    let levels = engine().compute(&data, &scored(Classification::Watchlist, 1.0)).unwrap();
    assert!((levels.entry.low - 0.955).abs() < 1e-9);
    assert!((levels.entry.high - 0.960).abs() < 1e-9);
    assert!((levels.entry.ideal - levels.entry.low).abs() < 1e-9);
}

#[test]
fn monitor_class_gets_no_levels() {
    let data = market();
    assert!(engine().compute(&data, &scored(Classification::Monitor, 1.0)).is_none());
    assert!(engine().compute(&data, &scored(Classification::None, 1.0)).is_none());
}

#[test]
fn position_sizing_follows_risk_config() {
    let mut risk = RiskConfig::default();
    risk.account_usd = 25_000.0;
    risk.risk_pct = 0.01;
    let data = market();
    let levels = LevelsEngine::new(risk)
        .compute(&data, &scored(Classification::Critical, 1.0))
        .unwrap();
    // stop 5% -> 25_000 * 0.01 / 0.05 = 5_000.
    assert!((levels.position_size_usd - 5_000.0).abs() < 1e-6);
}
