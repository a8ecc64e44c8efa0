//! Funding rate: shorts paying longs, and for how long they have been.

use crate::services::features::series_quality;
use crate::services::signals::{clamp_score, hours_covered, Curve, Evaluator};
use crate::types::{Signal, SignalKind, SymbolData};

const MAGNITUDE_WINDOW_HOURS: i64 = 24;
const PERSISTENCE_WINDOW_HOURS: usize = 72;

/// Rates milder than this count as neutral, not negative, so funding noise
/// around zero does not register as persistence.
const NEGATIVE_THRESHOLD: f64 = -0.0001;

/// |rate| for a negative 24h-average rate → sub-score.
const MAGNITUDE_CURVE: Curve = Curve(&[
    (0.0, 0.0),
    (0.00001, 45.0),
    (0.00002, 65.0),
    (0.00003, 78.0),
    (0.00005, 90.0),
    (0.0001, 100.0),
]);

/// Fraction of the last 72h of funding periods that were negative.
const PERSISTENCE_CURVE: Curve = Curve(&[
    (0.0, 0.0),
    (0.30, 20.0),
    (0.50, 45.0),
    (0.70, 70.0),
    (0.85, 90.0),
    (1.0, 100.0),
]);

const MAGNITUDE_WEIGHT: f64 = 0.55;
const PERSISTENCE_WEIGHT: f64 = 0.45;

pub struct FundingRate;

impl Evaluator for FundingRate {
    fn kind(&self) -> SignalKind {
        SignalKind::FundingRate
    }

    fn evaluate(&self, data: &SymbolData) -> Signal {
        let current = match data.mean_funding() {
            Some(rate) => rate,
            None => return Signal::empty(self.kind()),
        };

        // Magnitude: average rate across the last 24h of stored points plus
        // the live reading.
        let magnitude_cutoff = data.t - MAGNITUDE_WINDOW_HOURS * 3_600_000;
        let mut rates: Vec<f64> = data
            .funding_history
            .iter()
            .filter(|p| p.t >= magnitude_cutoff)
            .filter_map(|p| p.mean())
            .collect();
        rates.push(current);
        let avg_24h = rates.iter().sum::<f64>() / rates.len() as f64;

        let magnitude = if avg_24h >= 0.0 {
            0.0
        } else {
            MAGNITUDE_CURVE.eval(avg_24h.abs())
        };

        // Persistence: share of the last 72h that printed negative.
        let persistence_cutoff = data.t - PERSISTENCE_WINDOW_HOURS as i64 * 3_600_000;
        let mut negative = 0usize;
        let mut total = 0usize;
        for p in data
            .funding_history
            .iter()
            .filter(|p| p.t >= persistence_cutoff)
        {
            if let Some(rate) = p.mean() {
                total += 1;
                if rate < NEGATIVE_THRESHOLD {
                    negative += 1;
                }
            }
        }
        let persistence_frac = negative as f64 / total.max(1) as f64;
        let persistence = PERSISTENCE_CURVE.eval(persistence_frac);

        let score = MAGNITUDE_WEIGHT * magnitude + PERSISTENCE_WEIGHT * persistence;

        let timestamps: Vec<i64> = data.funding_history.iter().map(|p| p.t).collect();
        let quality = series_quality(
            hours_covered(&timestamps, data.t),
            PERSISTENCE_WINDOW_HOURS,
        );

        Signal::new(self.kind(), clamp_score(score), current, quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FundingPoint;
    use std::collections::HashMap;

    fn bundle(current: f64, history_rate: f64, hours: i64) -> SymbolData {
        let now = 1_000 * 3_600_000;
        let mut data = SymbolData {
            symbol: "WIF".into(),
            t: now,
            ..SymbolData::default()
        };
        data.funding_now.insert("binance".into(), current);
        for h in 0..hours {
            let mut rate = HashMap::new();
            rate.insert("binance".into(), history_rate);
            data.funding_history.push(FundingPoint {
                t: now - (hours - h) * 3_600_000,
                rate,
            });
        }
        data
    }

    #[test]
    fn test_positive_funding_scores_zero_magnitude() {
        // Positive everywhere: no magnitude, no persistence.
        let data = bundle(0.0001, 0.0001, 72);
        let signal = FundingRate.evaluate(&data);
        assert_eq!(signal.score, 0.0);
    }

    #[test]
    fn test_deeply_negative_and_persistent() {
        let data = bundle(-0.0002, -0.0002, 72);
        let signal = FundingRate.evaluate(&data);
        // Magnitude saturates (|rate| ≥ 1e-4 → 100); persistence 1.0 → 100.
        assert!((signal.score - 100.0).abs() < 1e-6);
        assert!((signal.raw - -0.0002).abs() < 1e-12);
    }

    #[test]
    fn test_combination_weights() {
        // Live negative but history positive: persistence stays 0 and only
        // the magnitude leg contributes.
        let mut data = bundle(-0.00004, 0.0002, 72);
        // Drop stored points inside the 24h magnitude window so only the
        // live reading feeds the average.
        let cutoff = data.t - 24 * 3_600_000;
        data.funding_history.retain(|p| p.t < cutoff);
        let signal = FundingRate.evaluate(&data);
        // avg24 = live only = -0.00004 -> between anchors 0.00003→78 and
        // 0.00005→90: 84. Persistence 0. Score = 0.55 * 84 = 46.2.
        assert!((signal.score - 46.2).abs() < 1e-6);
    }

    #[test]
    fn test_persistence_counts_only_negative_periods() {
        let now = 1_000 * 3_600_000;
        let mut data = SymbolData {
            symbol: "WIF".into(),
            t: now,
            ..SymbolData::default()
        };
        data.funding_now.insert("binance".into(), 0.00005);
        // 36 negative + 36 positive hourly points: persistence 0.5 → 45,
        // magnitude 0 (positive 24h tail).
        for h in 0..72 {
            let rate_value = if h < 36 { -0.0005 } else { 0.0005 };
            let mut rate = HashMap::new();
            rate.insert("binance".into(), rate_value);
            data.funding_history.push(FundingPoint {
                t: now - (72 - h) * 3_600_000,
                rate,
            });
        }
        let signal = FundingRate.evaluate(&data);
        assert!((signal.score - 0.45 * 45.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_funding_data() {
        let signal = FundingRate.evaluate(&SymbolData::default());
        assert_eq!(signal.score, 0.0);
        assert_eq!(signal.quality, crate::types::Quality::Low);
    }
}
