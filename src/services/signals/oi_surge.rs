//! Open-interest surge: positions building up while price stays quiet.

use crate::services::features::{gap_quality, series_quality};
use crate::services::signals::{clamp_score, hours_covered, Curve, Evaluator};
use crate::types::{Quality, Signal, SignalKind, SymbolData};

const LOOKBACK_HOURS: usize = 72;

/// OI change fraction over 72h → score. Flat growth below +10% ramps from
/// zero; +40% is already a 90.
const OI_CURVE: Curve = Curve(&[
    (0.0, 0.0),
    (0.10, 45.0),
    (0.20, 68.0),
    (0.30, 80.0),
    (0.40, 90.0),
    (0.60, 100.0),
]);

pub struct OiSurge;

impl OiSurge {
    /// Quiet accumulation is the point: once the 72h price move exceeds 2%,
    /// the score decays fast and a 10% move zeroes it.
    fn price_dampener(move_abs: f64) -> f64 {
        (1.0 - 10.0 * (move_abs - 0.02).max(0.0)).max(0.0)
    }
}

impl Evaluator for OiSurge {
    fn kind(&self) -> SignalKind {
        SignalKind::OiSurge
    }

    fn evaluate(&self, data: &SymbolData) -> Signal {
        let now_total = data.total_oi();
        if now_total <= 0.0 {
            return Signal::empty(self.kind());
        }

        let window_start = data.t - (LOOKBACK_HOURS as i64 + 1) * 3_600_000;
        let old = data
            .oi_history
            .iter()
            .find(|p| p.t >= window_start && p.total() > 0.0);
        let old_total = match old {
            Some(p) => p.total(),
            None => return Signal::empty(self.kind()),
        };

        let raw = (now_total - old_total) / old_total;
        let move_abs = data.price_return(LOOKBACK_HOURS).map_or(0.0, f64::abs);
        let score = OI_CURVE.eval(raw) * Self::price_dampener(move_abs);

        let timestamps: Vec<i64> = data.oi_history.iter().map(|p| p.t).collect();
        let quality = series_quality(hours_covered(&timestamps, data.t), LOOKBACK_HOURS)
            .min(gap_quality(&timestamps, 3));

        Signal::new(self.kind(), clamp_score(score), raw, quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OiPoint;
    use std::collections::HashMap;

    fn bundle(oi_now: f64, oi_old: f64, hours_back: i64) -> SymbolData {
        let now = 1_000 * 3_600_000;
        let mut data = SymbolData {
            symbol: "WIF".into(),
            t: now,
            ..SymbolData::default()
        };
        data.oi_now.insert("binance".into(), oi_now);
        for h in 0..=hours_back {
            let t = now - (hours_back - h) * 3_600_000;
            let mut map = HashMap::new();
            // Linear ramp from old to now.
            let frac = h as f64 / hours_back as f64;
            map.insert("binance".into(), oi_old + (oi_now - oi_old) * frac);
            data.oi_history.push(OiPoint { t, oi_usd: map });
        }
        data
    }

    #[test]
    fn test_anchor_scores() {
        // +20% with no price data: dampener is 1.
        let data = bundle(1_200_000.0, 1_000_000.0, 72);
        let signal = OiSurge.evaluate(&data);
        assert!((signal.raw - 0.20).abs() < 1e-9);
        assert!((signal.score - 68.0).abs() < 1e-6);
        assert_eq!(signal.quality, Quality::High);
    }

    #[test]
    fn test_monotonic_in_raw() {
        let mut prev = -1.0;
        for pct in [0.0, 0.05, 0.10, 0.15, 0.25, 0.35, 0.50, 0.80] {
            let data = bundle(1_000_000.0 * (1.0 + pct), 1_000_000.0, 72);
            let score = OiSurge.evaluate(&data).score;
            assert!(score >= prev, "score fell at oi change {}", pct);
            assert!((0.0..=100.0).contains(&score));
            prev = score;
        }
    }

    #[test]
    fn test_price_dampener_zeroes_at_ten_pct() {
        assert!((OiSurge::price_dampener(0.00) - 1.0).abs() < 1e-9);
        assert!((OiSurge::price_dampener(0.02) - 1.0).abs() < 1e-9);
        assert!((OiSurge::price_dampener(0.06) - 0.6).abs() < 1e-9);
        assert_eq!(OiSurge::price_dampener(0.10), 0.0);
        assert_eq!(OiSurge::price_dampener(0.50), 0.0);
    }

    #[test]
    fn test_no_history_is_zero_low() {
        let mut data = SymbolData::default();
        data.t = 1_000 * 3_600_000;
        data.oi_now.insert("binance".into(), 1_000_000.0);
        let signal = OiSurge.evaluate(&data);
        assert_eq!(signal.score, 0.0);
        assert_eq!(signal.quality, Quality::Low);
    }

    #[test]
    fn test_short_history_degrades_quality() {
        let data = bundle(1_200_000.0, 1_000_000.0, 40);
        let signal = OiSurge.evaluate(&data);
        assert_eq!(signal.quality, Quality::Med);

        let data = bundle(1_200_000.0, 1_000_000.0, 20);
        let signal = OiSurge.evaluate(&data);
        assert_eq!(signal.quality, Quality::Low);
    }
}
