//! Volume/price decoupling: turnover expanding while price goes nowhere.

use crate::services::features::volume_sum;
use crate::services::signals::{clamp_score, Curve, Evaluator};
use crate::types::{Quality, Signal, SignalKind, SymbolData};

/// Dampened volume-change fraction → score.
const DECOUPLE_CURVE: Curve = Curve(&[
    (0.0, 0.0),
    (0.10, 15.0),
    (0.20, 30.0),
    (0.35, 50.0),
    (0.50, 63.0),
    (0.75, 78.0),
    (1.0, 88.0),
    (1.5, 95.0),
    (2.0, 100.0),
]);

const FULL_WINDOW: usize = 48;
const MIN_CANDLES: usize = 20;

pub struct VolumePriceDecouple;

impl VolumePriceDecouple {
    /// Volume spikes that already moved price are chased, not accumulated:
    /// beyond a 2% 24h move the multiplier decays steeply.
    fn price_dampener(move_abs: f64) -> f64 {
        (1.0 - 12.0 * (move_abs - 0.02).max(0.0)).max(0.0)
    }
}

impl Evaluator for VolumePriceDecouple {
    fn kind(&self) -> SignalKind {
        SignalKind::VolumePriceDecouple
    }

    fn evaluate(&self, data: &SymbolData) -> Signal {
        let candles = &data.candles;
        if candles.len() < MIN_CANDLES {
            return Signal::empty(self.kind());
        }

        // Recent 24 candles vs the 24 before; halves when history is thin.
        let (recent, previous) = if candles.len() >= FULL_WINDOW {
            (
                &candles[candles.len() - 24..],
                &candles[candles.len() - 48..candles.len() - 24],
            )
        } else {
            let half = candles.len() / 2;
            (&candles[half..], &candles[..half])
        };

        let recent_vol = volume_sum(recent, recent.len());
        let previous_vol = volume_sum(previous, previous.len());
        if previous_vol <= 0.0 {
            return Signal::empty(self.kind());
        }

        let volume_change = (recent_vol - previous_vol) / previous_vol;
        let first_open = recent.first().map(|c| c.open).unwrap_or(0.0);
        let last_close = recent.last().map(|c| c.close).unwrap_or(0.0);
        let move_abs = if first_open > 0.0 {
            (last_close / first_open - 1.0).abs()
        } else {
            0.0
        };

        let raw = (volume_change.max(0.0)) * Self::price_dampener(move_abs);
        let quality = if candles.len() >= FULL_WINDOW {
            Quality::High
        } else {
            Quality::Med
        };

        Signal::new(self.kind(), clamp_score(DECOUPLE_CURVE.eval(raw)), raw, quality)
    }
}
