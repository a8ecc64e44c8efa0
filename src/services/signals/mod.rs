//! The nine accumulation signals.
//!
//! Each evaluator reads the collected `SymbolData` bundle and produces a
//! normalized 0–100 `Signal` through a piecewise-linear anchor curve, plus
//! the raw measurement and an input-sufficiency grade. Evaluators are pure:
//! no I/O, no clocks, no store access.

pub mod compression;
pub mod cross_volume;
pub mod curve;
pub mod decouple;
pub mod depth;
pub mod funding;
pub mod futures_volume;
pub mod liquidation;
pub mod long_short;
pub mod oi_surge;

pub use curve::{clamp_score, Curve};

use crate::types::{Signal, SignalKind, SymbolData};
use std::panic::AssertUnwindSafe;
use tracing::error;

/// One of the nine accumulation signals.
pub trait Evaluator: Send + Sync {
    fn kind(&self) -> SignalKind;

    /// Compute the signal. Thin data yields a zero score at LOW quality,
    /// never an error.
    fn evaluate(&self, data: &SymbolData) -> Signal;
}

/// All nine evaluators, in composite-weight order.
pub fn all_evaluators() -> Vec<Box<dyn Evaluator>> {
    vec![
        Box::new(oi_surge::OiSurge),
        Box::new(funding::FundingRate),
        Box::new(liquidation::LiquidationLeverage),
        Box::new(cross_volume::CrossExchangeVolume),
        Box::new(depth::DepthImbalance),
        Box::new(decouple::VolumePriceDecouple),
        Box::new(compression::VolatilityCompression),
        Box::new(long_short::LongShortRatio),
        Box::new(futures_volume::FuturesVolumeDivergence),
    ]
}

/// Run every evaluator over the bundle. A panicking evaluator is logged with
/// symbol context and contributes a zero LOW-quality signal; the scan
/// continues.
pub fn evaluate_all(data: &SymbolData) -> Vec<Signal> {
    all_evaluators()
        .iter()
        .map(|evaluator| {
            let kind = evaluator.kind();
            match std::panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(data))) {
                Ok(signal) => signal,
                Err(_) => {
                    error!(symbol = %data.symbol, signal = %kind, "evaluator panicked");
                    Signal::empty(kind)
                }
            }
        })
        .collect()
}

/// Hours of history a timestamp series actually covers, ending at `now`.
pub(crate) fn hours_covered(timestamps: &[i64], now: i64) -> usize {
    timestamps
        .first()
        .map(|first| ((now - first).max(0) / 3_600_000) as usize)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Quality;

    struct Panicky;
    impl Evaluator for Panicky {
        fn kind(&self) -> SignalKind {
            SignalKind::OiSurge
        }
        fn evaluate(&self, _data: &SymbolData) -> Signal {
            panic!("boom")
        }
    }

    #[test]
    fn test_all_nine_present_in_order() {
        let evaluators = all_evaluators();
        let kinds: Vec<SignalKind> = evaluators.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, SignalKind::ALL);
    }

    #[test]
    fn test_empty_bundle_yields_nine_zero_signals() {
        let data = SymbolData::default();
        let signals = evaluate_all(&data);
        assert_eq!(signals.len(), 9);
        for s in &signals {
            assert_eq!(s.score, 0.0);
            assert_eq!(s.quality, Quality::Low);
        }
    }

    #[test]
    fn test_panicking_evaluator_degrades_to_zero() {
        let data = SymbolData::default();
        let evaluator = Panicky;
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(&data)));
        assert!(result.is_err());
        // evaluate_all itself must not propagate the panic.
        let signals = evaluate_all(&data);
        assert_eq!(signals.len(), 9);
    }

    #[test]
    fn test_hours_covered() {
        let now = 100 * 3_600_000;
        let ts: Vec<i64> = (28..=100).map(|h| h * 3_600_000).collect();
        assert_eq!(hours_covered(&ts, now), 72);
        assert_eq!(hours_covered(&[], now), 0);
    }
}
