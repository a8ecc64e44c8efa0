//! Adaptive trade levels for alerted symbols: stop, entry band, staggered
//! take-profits, trailing directive, R:R and position sizing.

use crate::config::RiskConfig;
use crate::services::features::{
    ask_walls, atr, book_clusters, median_cluster_usd, swing_low, vwap,
};
use crate::types::{
    Classification, EntryZone, Quality, ScanResult, SignalKind, SmartLevels, StopLevel,
    StopMethod, SymbolData, TakeProfit,
};
use tracing::debug;

/// Stop distance bounds, fraction of price.
const MIN_STOP_PCT: f64 = 0.025;
const MAX_STOP_PCT: f64 = 0.15;

/// ATR stop multipliers: default, thin data, cascade-prone.
const ATR_MULT_DEFAULT: f64 = 2.0;
const ATR_MULT_LOW_QUALITY: f64 = 1.5;
const ATR_MULT_CASCADE: f64 = 2.5;

/// Cascade ratio at which stops widen and TPs stretch.
const CASCADE_WIDE: f64 = 5.0;

/// Take-profit ATR multiples for TP1..TP3.
const TP_MULTIPLES: [f64; 3] = [3.0, 5.5, 9.0];

/// TP snapping: land 0.2% under a wall, but never give up more than 15% of
/// the unadjusted level.
const SNAP_UNDER_WALL: f64 = 0.998;
const MAX_SNAP_GIVEUP: f64 = 0.85;

/// Keep TPs strictly ordered even after snapping.
const MIN_TP_STEP: f64 = 1.02;

/// Derives trade levels from the collected bundle and the scored result.
pub struct LevelsEngine {
    risk: RiskConfig,
}

impl LevelsEngine {
    pub fn new(risk: RiskConfig) -> Self {
        Self { risk }
    }

    /// Compute levels for a result that warrants them. `None` when price or
    /// volatility cannot be established.
    pub fn compute(&self, data: &SymbolData, result: &ScanResult) -> Option<SmartLevels> {
        if !result.classification.wants_levels() {
            return None;
        }
        let price = data.price().filter(|p| *p > 0.0)?;
        let atr_value = atr(&data.candles, 14).filter(|a| *a > 0.0)?;
        let cascade_ratio = result
            .signals
            .iter()
            .find(|s| s.kind == SignalKind::LiquidationLeverage)
            .map(|s| s.raw)
            .unwrap_or(1.0);

        let stop = self.stop(data, price, atr_value, cascade_ratio, result.quality);
        let entry = self.entry(data, price, atr_value, result.classification);
        let take_profits = self.take_profits(data, price, atr_value, cascade_ratio);
        let trail_pct = 2.0 * atr_value / price;

        let risk_per_unit = price - stop.price;
        let risk_reward = if risk_per_unit > 0.0 {
            (take_profits[0].price - price) / risk_per_unit
        } else {
            0.0
        };
        let position_size_usd = self.risk.account_usd * self.risk.risk_pct / stop.pct;

        debug!(
            symbol = %result.symbol,
            stop = stop.price,
            method = stop.method.as_str(),
            tp1 = take_profits[0].price,
            rr = format!("{:.2}", risk_reward),
            "levels"
        );

        Some(SmartLevels {
            price,
            atr: atr_value,
            stop,
            entry,
            take_profits,
            trail_pct,
            risk_reward,
            position_size_usd,
            quality: result.quality,
        })
    }

    /// Stop selection: of the ATR, swing-low and book-support candidates
    /// that sit at least 1 ATR below price and inside the distance bounds,
    /// the deepest wins; the ATR stop is the fallback. The final distance is
    /// clamped to [2.5%, 15%].
    fn stop(
        &self,
        data: &SymbolData,
        price: f64,
        atr_value: f64,
        cascade_ratio: f64,
        quality: Quality,
    ) -> StopLevel {
        let atr_mult = if quality == Quality::Low {
            ATR_MULT_LOW_QUALITY
        } else if cascade_ratio >= CASCADE_WIDE {
            ATR_MULT_CASCADE
        } else {
            ATR_MULT_DEFAULT
        };
        let atr_stop = price - atr_mult * atr_value;

        let mut candidates: Vec<(StopMethod, f64)> = vec![(StopMethod::Atr, atr_stop)];

        if let Some(low) = swing_low(&data.candles, 24) {
            candidates.push((StopMethod::SwingLow, low - 0.25 * atr_value));
        }

        let book = data.merged_book();
        let bid_clusters = book_clusters(&book.bids, price, 0.15, 0.005, true);
        if let Some(median) = median_cluster_usd(&bid_clusters) {
            if let Some(largest) = bid_clusters
                .iter()
                .max_by(|a, b| a.usd.partial_cmp(&b.usd).unwrap_or(std::cmp::Ordering::Equal))
            {
                if largest.usd >= 0.5 * median {
                    candidates.push((StopMethod::BookSupport, largest.price - 0.1 * atr_value));
                }
            }
        }

        let in_bounds = |stop: f64| {
            let pct = (price - stop) / price;
            (MIN_STOP_PCT..=MAX_STOP_PCT).contains(&pct)
        };
        let chosen = candidates
            .iter()
            .filter(|(_, stop)| price - stop >= atr_value && in_bounds(*stop))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .copied()
            .unwrap_or((StopMethod::Atr, atr_stop));

        let clamped = chosen
            .1
            .clamp(price * (1.0 - MAX_STOP_PCT), price * (1.0 - MIN_STOP_PCT));
        StopLevel {
            price: clamped,
            pct: (price - clamped) / price,
            method: chosen.0,
        }
    }

    /// Entry band by classification: chase, pull back to VWAP, or wait at
    /// the swing low.
    fn entry(
        &self,
        data: &SymbolData,
        price: f64,
        atr_value: f64,
        classification: Classification,
    ) -> EntryZone {
        match classification {
            Classification::Critical => EntryZone {
                low: price * 0.998,
                high: price * 1.004,
                ideal: price,
            },
            Classification::HighAlert => {
                let high = price * 0.995;
                let vwap_24h = vwap(&data.candles, 24).unwrap_or(price * 0.985);
                let low = vwap_24h.max(price * 0.985).min(high);
                EntryZone {
                    low,
                    high,
                    ideal: (low + high) / 2.0,
                }
            }
            _ => {
                let low = swing_low(&data.candles, 24).unwrap_or(price - 2.0 * atr_value);
                EntryZone {
                    low,
                    high: low + 0.25 * atr_value,
                    ideal: low,
                }
            }
        }
    }

    /// TP1..TP3 at cascade-stretched ATR multiples, snapped under ask walls
    /// within reach.
    fn take_profits(
        &self,
        data: &SymbolData,
        price: f64,
        atr_value: f64,
        cascade_ratio: f64,
    ) -> Vec<TakeProfit> {
        let k = (1.0 + 0.1 * (cascade_ratio - 3.0)).clamp(1.0, 1.8);
        let book = data.merged_book();
        let walls = ask_walls(&book.asks, price, 0.60);

        let mut levels = Vec::with_capacity(3);
        let mut floor = price;
        for (i, multiple) in TP_MULTIPLES.iter().enumerate() {
            let unadjusted = price + multiple * k * atr_value;
            let mut target = unadjusted;
            let mut snapped = false;

            // Nearest wall below the computed target, above the price.
            if let Some(wall) = walls
                .iter()
                .filter(|w| w.price > price && w.price <= unadjusted)
                .last()
            {
                let candidate = wall.price * SNAP_UNDER_WALL;
                if candidate >= unadjusted * MAX_SNAP_GIVEUP && candidate > price {
                    target = candidate;
                    snapped = true;
                }
            }

            // Ordering guard: price < TP1 < TP2 < TP3.
            if target <= floor * MIN_TP_STEP {
                target = floor * MIN_TP_STEP;
                snapped = false;
            }
            floor = target;

            levels.push(TakeProfit {
                level: (i + 1) as u8,
                price: target,
                pct: target / price - 1.0,
                snapped,
            });
        }
        levels
    }
}
