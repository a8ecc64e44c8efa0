//! Depth imbalance: resting bid notional vs ask notional near the price.

use crate::services::features::cluster_summary;
use crate::services::signals::{clamp_score, Curve, Evaluator};
use crate::types::{Quality, Signal, SignalKind, SymbolData};

/// Band around price considered "near": ±10%.
const WINDOW_PCT: f64 = 0.10;

/// bid/ask notional ratio → score. Balanced books score zero.
const IMBALANCE_CURVE: Curve = Curve(&[
    (1.0, 0.0),
    (1.15, 15.0),
    (1.3, 30.0),
    (1.5, 50.0),
    (2.0, 75.0),
    (2.5, 88.0),
    (3.0, 95.0),
    (4.0, 100.0),
]);

/// Minimum merged levels per side for a HIGH-quality reading.
const MIN_LEVELS: usize = 20;

pub struct DepthImbalance;

impl Evaluator for DepthImbalance {
    fn kind(&self) -> SignalKind {
        SignalKind::DepthImbalance
    }

    fn evaluate(&self, data: &SymbolData) -> Signal {
        let price = match data.price() {
            Some(p) if p > 0.0 => p,
            _ => return Signal::empty(self.kind()),
        };
        let book = data.merged_book();
        if book.bids.is_empty() || book.asks.is_empty() {
            return Signal::empty(self.kind());
        }

        let bid_usd = cluster_summary(&book.bids, price, WINDOW_PCT, 0.005, true).total_usd;
        let ask_usd = cluster_summary(&book.asks, price, WINDOW_PCT, 0.005, false).total_usd;
        if ask_usd <= 0.0 {
            return Signal::empty(self.kind());
        }

        let ratio = bid_usd / ask_usd;
        let score = if ratio >= 1.0 {
            IMBALANCE_CURVE.eval(ratio)
        } else {
            0.0
        };

        let quality = if book.bids.len() >= MIN_LEVELS && book.asks.len() >= MIN_LEVELS {
            Quality::High
        } else {
            Quality::Med
        };

        Signal::new(self.kind(), clamp_score(score), ratio, quality)
    }
}
