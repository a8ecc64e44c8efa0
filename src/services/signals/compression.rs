//! Volatility compression: Bollinger bands at the tight end of their own
//! history. Quiet charts precede loud ones.

use crate::services::features::bbw_compression;
use crate::services::signals::{clamp_score, Curve, Evaluator};
use crate::types::{Quality, Signal, SignalKind, SymbolData};

/// Compression (share of historical band widths wider than now) → score.
const COMPRESSION_CURVE: Curve = Curve(&[
    (0.0, 0.0),
    (0.30, 10.0),
    (0.50, 25.0),
    (0.65, 42.0),
    (0.75, 58.0),
    (0.85, 75.0),
    (0.95, 95.0),
    (1.0, 100.0),
]);

const HIGH_QUALITY_CANDLES: usize = 100;
const MIN_CANDLES: usize = 30;

pub struct VolatilityCompression;

impl Evaluator for VolatilityCompression {
    fn kind(&self) -> SignalKind {
        SignalKind::VolatilityCompression
    }

    fn evaluate(&self, data: &SymbolData) -> Signal {
        if data.candles.len() < MIN_CANDLES {
            return Signal::empty(self.kind());
        }
        let (_, compression) = match bbw_compression(&data.candles) {
            Some(pair) => pair,
            None => return Signal::empty(self.kind()),
        };

        let quality = if data.candles.len() >= HIGH_QUALITY_CANDLES {
            Quality::High
        } else {
            Quality::Med
        };

        Signal::new(
            self.kind(),
            clamp_score(COMPRESSION_CURVE.eval(compression)),
            compression,
            quality,
        )
    }
}
