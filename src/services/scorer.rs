//! Composite scoring: weighted signal sum, interaction bonuses, extension
//! penalty, classification.

use crate::config::Thresholds;
use crate::types::{Quality, ScanResult, Signal, SignalKind};
use tracing::debug;

/// Extension penalty multiplier and trigger (7-day return above 15%).
const EXTENSION_PENALTY: f64 = 0.60;
const EXTENSION_THRESHOLD: f64 = 0.15;

/// One interaction bonus: all named signals at/above the activation minimum
/// multiply the score. Applied multiplicatively, in this order, each at most
/// once per scan.
struct Bonus {
    name: &'static str,
    signals: [SignalKind; 3],
    multiplier: f64,
}

const BONUSES: [Bonus; 3] = [
    Bonus {
        name: "squeeze_setup",
        signals: [
            SignalKind::OiSurge,
            SignalKind::FundingRate,
            SignalKind::VolatilityCompression,
        ],
        multiplier: 1.25,
    },
    Bonus {
        name: "cascade_setup",
        signals: [
            SignalKind::LiquidationLeverage,
            SignalKind::FundingRate,
            SignalKind::LongShortRatio,
        ],
        multiplier: 1.30,
    },
    Bonus {
        name: "accumulation_setup",
        signals: [
            SignalKind::OiSurge,
            SignalKind::VolumePriceDecouple,
            SignalKind::CrossExchangeVolume,
        ],
        multiplier: 1.20,
    },
];

/// Scores one symbol's signal battery into a classified result.
pub struct Scorer {
    thresholds: Thresholds,
}

impl Scorer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    fn bonus_minimum(&self, name: &str) -> f64 {
        match name {
            "squeeze_setup" => self.thresholds.squeeze_min,
            "cascade_setup" => self.thresholds.cascade_min,
            _ => self.thresholds.accumulation_min,
        }
    }

    /// Combine the nine signals into a final score and classification.
    ///
    /// `return_7d` is the fractional 7-day price return; above +15% the
    /// extension penalty multiplies the score by 0.60. `collection_quality`
    /// carries fetch-level degradation into the result's quality badge.
    pub fn score(
        &self,
        symbol: &str,
        t: i64,
        signals: Vec<Signal>,
        return_7d: Option<f64>,
        collection_quality: Quality,
    ) -> ScanResult {
        let score_of = |kind: SignalKind| -> f64 {
            signals
                .iter()
                .find(|s| s.kind == kind)
                .map(|s| s.score)
                .unwrap_or(0.0)
        };

        let base: f64 = SignalKind::ALL
            .iter()
            .map(|kind| kind.weight() * score_of(*kind))
            .sum();

        let mut final_score = base;
        let mut bonuses_applied = Vec::new();
        for bonus in &BONUSES {
            let minimum = self.bonus_minimum(bonus.name);
            if bonus.signals.iter().all(|kind| score_of(*kind) >= minimum) {
                final_score *= bonus.multiplier;
                bonuses_applied.push(bonus.name.to_string());
            }
        }

        let penalty_applied = return_7d.map_or(false, |r| r > EXTENSION_THRESHOLD);
        if penalty_applied {
            final_score *= EXTENSION_PENALTY;
        }

        let final_score = final_score.clamp(0.0, 100.0);
        let classification = self.thresholds.classify(final_score);

        // Aggregate quality: the worst grade among signals that actually
        // contributed, floored by the collection-level grade.
        let signal_quality = signals
            .iter()
            .filter(|s| s.score > 0.0)
            .map(|s| s.quality)
            .fold(None, |acc: Option<Quality>, q| {
                Some(acc.map_or(q, |a| a.min(q)))
            })
            .unwrap_or(Quality::Low);

        debug!(
            symbol,
            base = format!("{:.2}", base),
            final_score = format!("{:.2}", final_score),
            class = %classification,
            bonuses = ?bonuses_applied,
            penalty = penalty_applied,
            "scored"
        );

        ScanResult {
            symbol: symbol.to_string(),
            t,
            base_score: base,
            final_score,
            classification,
            signals,
            bonuses_applied,
            penalty_applied,
            levels: None,
            quality: signal_quality.min(collection_quality),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Classification;

    fn signals(scores: [f64; 9]) -> Vec<Signal> {
        SignalKind::ALL
            .iter()
            .zip(scores)
            .map(|(kind, score)| Signal::new(*kind, score, 0.0, Quality::High))
            .collect()
    }

    fn scorer() -> Scorer {
        Scorer::new(Thresholds::default())
    }

    // Order: oi, funding, liq, cross, depth, decouple, volcomp, ls, futvol.
    const SQUEEZE_BOOK: [f64; 9] = [78.0, 72.0, 65.0, 48.0, 58.0, 42.0, 55.0, 38.0, 32.0];

    #[test]
    fn test_textbook_squeeze_goes_critical() {
        let result = scorer().score("WIF", 0, signals(SQUEEZE_BOOK), Some(0.04), Quality::High);
        assert!((result.base_score - 59.69).abs() < 1e-9);
        // squeeze ×1.25 and accumulation ×1.20 apply; cascade misses on
        // ls = 38 < 40.
        assert_eq!(result.bonuses_applied, vec!["squeeze_setup", "accumulation_setup"]);
        assert!((result.final_score - 89.535).abs() < 1e-9);
        assert_eq!(result.classification, Classification::Critical);
        assert!(!result.penalty_applied);
    }

    #[test]
    fn test_extension_penalty_demotes() {
        let result = scorer().score("WIF", 0, signals(SQUEEZE_BOOK), Some(0.18), Quality::High);
        assert!(result.penalty_applied);
        assert!((result.final_score - 53.721).abs() < 1e-9);
        assert_eq!(result.classification, Classification::Watchlist);
    }

    #[test]
    fn test_penalty_boundary_is_strict() {
        // Exactly +15% is not extended.
        let result = scorer().score("WIF", 0, signals(SQUEEZE_BOOK), Some(0.15), Quality::High);
        assert!(!result.penalty_applied);
    }

    #[test]
    fn test_longs_dominant_no_alert() {
        let book = [70.0, 0.0, 20.0, 20.0, 20.0, 20.0, 20.0, 6.0, 20.0];
        let result = scorer().score("WIF", 0, signals(book), Some(0.0), Quality::High);
        assert!((result.base_score - 24.76).abs() < 1e-9);
        assert!(result.bonuses_applied.is_empty());
        assert_eq!(result.classification, Classification::None);
    }

    #[test]
    fn test_all_zero_and_all_hundred() {
        let result = scorer().score("WIF", 0, signals([0.0; 9]), None, Quality::High);
        assert_eq!(result.final_score, 0.0);

        let result = scorer().score("WIF", 0, signals([100.0; 9]), None, Quality::High);
        // Bonuses fire but the clamp holds the ceiling.
        assert_eq!(result.final_score, 100.0);
    }

    #[test]
    fn test_bonuses_deterministic_and_single_application() {
        let result = scorer().score("WIF", 0, signals(SQUEEZE_BOOK), None, Quality::High);
        let again = scorer().score("WIF", 0, signals(SQUEEZE_BOOK), None, Quality::High);
        assert_eq!(result.bonuses_applied, again.bonuses_applied);
        assert_eq!(result.bonuses_applied.len(), 2);
        // Each name appears once.
        let mut names = result.bonuses_applied.clone();
        names.dedup();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_cascade_activation_at_threshold() {
        // ls exactly at 40 flips cascade on: ×1.25 ×1.30 ×1.20.
        let mut book = SQUEEZE_BOOK;
        book[7] = 40.0;
        let result = scorer().score("WIF", 0, signals(book), None, Quality::High);
        assert_eq!(
            result.bonuses_applied,
            vec!["squeeze_setup", "cascade_setup", "accumulation_setup"]
        );
        let base = result.base_score;
        assert!((result.final_score - (base * 1.25 * 1.30 * 1.20).clamp(0.0, 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_quality_aggregates_minimum_of_active() {
        let mut sigs = signals(SQUEEZE_BOOK);
        sigs[3].quality = Quality::Low;
        let result = scorer().score("WIF", 0, sigs, None, Quality::High);
        assert_eq!(result.quality, Quality::Low);

        // A LOW signal with zero score is not active and does not drag.
        let mut sigs = signals(SQUEEZE_BOOK);
        sigs[8].score = 0.0;
        sigs[8].quality = Quality::Low;
        let result = scorer().score("WIF", 0, sigs, None, Quality::High);
        assert_eq!(result.quality, Quality::High);
    }

    #[test]
    fn test_collection_quality_floors_result() {
        let result = scorer().score("WIF", 0, signals(SQUEEZE_BOOK), None, Quality::Med);
        assert_eq!(result.quality, Quality::Med);
    }

    #[test]
    fn test_threshold_overrides_respected() {
        let mut thresholds = Thresholds::default();
        thresholds.squeeze_min = 80.0;
        let scorer = Scorer::new(thresholds);
        let result = scorer.score("WIF", 0, signals(SQUEEZE_BOOK), None, Quality::High);
        // With squeeze_min at 80 only accumulation fires.
        assert_eq!(result.bonuses_applied, vec!["accumulation_setup"]);
    }
}
