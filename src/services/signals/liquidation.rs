//! Liquidation leverage: short notional that would be forced to cover
//! within +15%, measured against the ask-side resistance standing in its
//! way. Ratios above ~2 mean a squeeze can feed itself.

use crate::services::features::cluster_summary;
use crate::services::signals::{clamp_score, Curve, Evaluator};
use crate::types::{Quality, Signal, SignalKind, SymbolData};

/// Liquidation window above current price.
const WINDOW_PCT: f64 = 0.15;

/// Assumed short leverage when entry distribution is unknown: a short at
/// entry `e` with 8x liquidates near `e * (1 + 1/8)`.
const ASSUMED_LEVERAGE: f64 = 8.0;

/// Price-range lookback used to spread short entries uniformly.
const RANGE_LOOKBACK_CANDLES: usize = 720;

/// At most this share of short notional is treated as reachable; a uniform
/// entry spread never puts everything inside one 15% band.
const MAX_REACHABLE_FRACTION: f64 = 0.8;

/// liq-vs-ask ratio → score.
const LEVERAGE_CURVE: Curve = Curve(&[
    (0.5, 0.0),
    (1.0, 10.0),
    (2.0, 35.0),
    (3.0, 55.0),
    (5.0, 75.0),
    (8.0, 90.0),
    (12.0, 100.0),
]);

pub struct LiquidationLeverage;

impl LiquidationLeverage {
    /// Fraction of short notional whose liquidation lands within +15% of
    /// `price`, assuming entries spread uniformly over the last 30 days'
    /// close range and uniform 8x leverage.
    fn reachable_fraction(data: &SymbolData, price: f64) -> f64 {
        let start = data.candles.len().saturating_sub(RANGE_LOOKBACK_CANDLES);
        let closes = &data.candles[start..];
        let (mut lo, mut hi) = (f64::MAX, f64::MIN);
        for c in closes {
            if c.close > 0.0 {
                lo = lo.min(c.close);
                hi = hi.max(c.close);
            }
        }
        if !(lo < hi) {
            return MAX_REACHABLE_FRACTION;
        }
        // A short liquidates at entry * (1 + 1/L); it is reachable when that
        // lies at or below price * (1 + 15%).
        let entry_cutoff = price * (1.0 + WINDOW_PCT) / (1.0 + 1.0 / ASSUMED_LEVERAGE);
        let fraction = ((entry_cutoff.min(hi) - lo) / (hi - lo)).clamp(0.0, 1.0);
        fraction.min(MAX_REACHABLE_FRACTION)
    }
}

impl Evaluator for LiquidationLeverage {
    fn kind(&self) -> SignalKind {
        SignalKind::LiquidationLeverage
    }

    fn evaluate(&self, data: &SymbolData) -> Signal {
        let price = match data.price() {
            Some(p) if p > 0.0 => p,
            _ => return Signal::empty(self.kind()),
        };
        let total_oi = data.total_oi();
        if total_oi <= 0.0 {
            return Signal::empty(self.kind());
        }

        // Short share of OI from the L/S ratio; an even book when unknown.
        let (short_fraction, ls_known) = match data.mean_ls() {
            Some(ls) => (1.0 / (1.0 + ls), true),
            None => (0.5, false),
        };
        let short_notional = total_oi * short_fraction;
        let liq_within = short_notional * Self::reachable_fraction(data, price);

        let book = data.merged_book();
        let ask_resistance = cluster_summary(&book.asks, price, WINDOW_PCT, 0.01, false).total_usd;

        let (ratio, book_known) = if ask_resistance > 0.0 {
            (liq_within / ask_resistance, true)
        } else {
            // No measurable wall: neutral-ish default rather than infinity.
            (3.0, false)
        };

        let quality = if ls_known && book_known {
            Quality::High
        } else if ls_known || book_known {
            Quality::Med
        } else {
            Quality::Low
        };

        Signal::new(self.kind(), clamp_score(LEVERAGE_CURVE.eval(ratio)), ratio, quality)
    }
}
