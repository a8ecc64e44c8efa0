//! Long/short account ratio: a short-crowded book is fuel for a squeeze.

use crate::services::signals::{clamp_score, Curve, Evaluator};
use crate::types::{Quality, Signal, SignalKind, SymbolData};

/// Mean L/S ratio → score: the shorter the crowd, the higher. Above parity
/// the score fades linearly to zero at 1.2.
const LS_CURVE: Curve = Curve(&[
    (0.5, 100.0),
    (0.6, 90.0),
    (0.7, 75.0),
    (0.8, 55.0),
    (0.9, 30.0),
    (1.0, 8.0),
    (1.2, 0.0),
]);

pub struct LongShortRatio;

impl Evaluator for LongShortRatio {
    fn kind(&self) -> SignalKind {
        SignalKind::LongShortRatio
    }

    fn evaluate(&self, data: &SymbolData) -> Signal {
        // Live reading first; fall back to the newest stored point.
        let (ratio, quality) = match data.mean_ls() {
            Some(r) => (r, Quality::High),
            None => match data.ls_history.last().and_then(|p| p.mean()) {
                Some(r) => (r, Quality::Med),
                None => return Signal::empty(self.kind()),
            },
        };

        Signal::new(self.kind(), clamp_score(LS_CURVE.eval(ratio)), ratio, quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LsPoint;
    use std::collections::HashMap;

    fn bundle(ratio: f64) -> SymbolData {
        let mut data = SymbolData::default();
        data.ls_now.insert("binance".into(), ratio);
        data
    }

    #[test]
    fn test_anchor_scores() {
        assert!((LongShortRatio.evaluate(&bundle(0.60)).score - 90.0).abs() < 1e-6);
        assert!((LongShortRatio.evaluate(&bundle(0.70)).score - 75.0).abs() < 1e-6);
        assert!((LongShortRatio.evaluate(&bundle(0.90)).score - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_longs_dominant_fades_out() {
        // Parity scores 8, 1.1 is halfway down to zero at 1.2.
        assert!((LongShortRatio.evaluate(&bundle(1.0)).score - 8.0).abs() < 1e-6);
        assert!((LongShortRatio.evaluate(&bundle(1.1)).score - 4.0).abs() < 1e-6);
        assert_eq!(LongShortRatio.evaluate(&bundle(1.3)).score, 0.0);
    }

    #[test]
    fn test_monotonic_nonincreasing_in_ratio() {
        let mut prev = 101.0;
        for r in [0.4, 0.55, 0.65, 0.8, 0.95, 1.05, 1.25] {
            let score = LongShortRatio.evaluate(&bundle(r)).score;
            assert!(score <= prev, "score rose at ratio {}", r);
            assert!((0.0..=100.0).contains(&score));
            prev = score;
        }
    }

    #[test]
    fn test_history_fallback_is_med_quality() {
        let mut data = SymbolData::default();
        let mut ratio = HashMap::new();
        ratio.insert("binance".into(), 0.7);
        data.ls_history.push(LsPoint { t: 0, ratio });
        let signal = LongShortRatio.evaluate(&data);
        assert!((signal.score - 75.0).abs() < 1e-6);
        assert_eq!(signal.quality, Quality::Med);
    }

    #[test]
    fn test_no_data() {
        let signal = LongShortRatio.evaluate(&SymbolData::default());
        assert_eq!(signal.score, 0.0);
        assert_eq!(signal.quality, Quality::Low);
    }
}
