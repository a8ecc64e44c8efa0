//! Futures volume divergence: current turnover against the symbol's own
//! 72-hour baseline.

use crate::services::features::series_quality;
use crate::services::signals::{clamp_score, hours_covered, Curve, Evaluator};
use crate::types::{Signal, SignalKind, SymbolData};

const BASELINE_WINDOW_HOURS: usize = 72;
const MIN_POINTS: usize = 5;

/// now / 72h-mean volume ratio → score.
const VOLUME_CURVE: Curve = Curve(&[
    (0.5, 0.0),
    (1.0, 5.0),
    (1.3, 20.0),
    (1.5, 35.0),
    (2.0, 55.0),
    (2.5, 68.0),
    (3.0, 78.0),
    (4.0, 90.0),
    (6.0, 100.0),
]);

pub struct FuturesVolumeDivergence;

impl Evaluator for FuturesVolumeDivergence {
    fn kind(&self) -> SignalKind {
        SignalKind::FuturesVolumeDivergence
    }

    fn evaluate(&self, data: &SymbolData) -> Signal {
        let current: f64 = data.tickers.values().map(|t| t.volume_24h).sum();
        if current <= 0.0 {
            return Signal::empty(self.kind());
        }

        let cutoff = data.t - BASELINE_WINDOW_HOURS as i64 * 3_600_000;
        let history: Vec<&crate::types::TickerSnap> = data
            .ticker_history
            .iter()
            .filter(|s| s.t >= cutoff && s.vol24 > 0.0)
            .collect();
        if history.len() < MIN_POINTS {
            return Signal::empty(self.kind());
        }
        let mean = history.iter().map(|s| s.vol24).sum::<f64>() / history.len() as f64;
        if mean <= 0.0 {
            return Signal::empty(self.kind());
        }

        let ratio = current / mean;
        let timestamps: Vec<i64> = history.iter().map(|s| s.t).collect();
        let quality = series_quality(hours_covered(&timestamps, data.t), BASELINE_WINDOW_HOURS);

        Signal::new(self.kind(), clamp_score(VOLUME_CURVE.eval(ratio)), ratio, quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Quality, TickerData, TickerSnap};
    use std::collections::HashMap;

    fn bundle(current: f64, baseline: f64, hours: i64) -> SymbolData {
        let now = 1_000 * 3_600_000;
        let mut data = SymbolData {
            t: now,
            ..SymbolData::default()
        };
        data.tickers.insert(
            "binance".into(),
            TickerData { t: now, price: 1.0, bid: None, ask: None, volume_24h: current },
        );
        for h in 0..hours {
            data.ticker_history.push(TickerSnap {
                t: now - (hours - h) * 3_600_000,
                price: 1.0,
                vol24: baseline,
                bid: None,
                ask: None,
                per_exchange: HashMap::new(),
            });
        }
        data
    }

    #[test]
    fn test_ratio_anchors() {
        let signal = FuturesVolumeDivergence.evaluate(&bundle(2_000_000.0, 1_000_000.0, 72));
        assert!((signal.raw - 2.0).abs() < 1e-9);
        assert!((signal.score - 55.0).abs() < 1e-6);
        assert_eq!(signal.quality, Quality::High);
    }

    #[test]
    fn test_baseline_volume_scores_low() {
        let signal = FuturesVolumeDivergence.evaluate(&bundle(1_000_000.0, 1_000_000.0, 72));
        assert!((signal.score - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_monotonic_in_ratio() {
        let mut prev = -1.0;
        for mult in [0.5, 1.0, 1.5, 2.0, 3.0, 5.0, 7.0] {
            let score = FuturesVolumeDivergence
                .evaluate(&bundle(mult * 1_000_000.0, 1_000_000.0, 72))
                .score;
            assert!(score >= prev);
            prev = score;
        }
    }

    #[test]
    fn test_thin_history_is_zero_low() {
        let signal = FuturesVolumeDivergence.evaluate(&bundle(2_000_000.0, 1_000_000.0, 3));
        assert_eq!(signal.score, 0.0);
        assert_eq!(signal.quality, Quality::Low);
    }

    #[test]
    fn test_partial_history_degrades_quality() {
        let signal = FuturesVolumeDivergence.evaluate(&bundle(2_000_000.0, 1_000_000.0, 40));
        assert_eq!(signal.quality, Quality::Med);
    }
}
