//! Cross-scan event detection: diff the current result against the prior
//! one for the same symbol.

use crate::types::{ScanEvent, ScanResult};

/// Score delta that qualifies as a jump.
const SCORE_JUMP_DELTA: f64 = 15.0;

/// 6-hour price move that, with a live score, counts as ignition.
const IGNITION_MOVE: f64 = 0.05;

/// Minimum final score for ignition to matter.
const IGNITION_MIN_SCORE: f64 = 48.0;

/// Detect SCORE_JUMP / UPGRADE / IGNITION, emitted in exactly that order.
///
/// `move_6h` is the fractional price return over the last six hours, when
/// known. Jump and upgrade need a previous result; ignition does not.
pub fn detect_events(
    current: &ScanResult,
    previous: Option<&ScanResult>,
    move_6h: Option<f64>,
) -> Vec<ScanEvent> {
    let mut events = Vec::new();

    if let Some(prev) = previous {
        let delta = current.final_score - prev.final_score;
        if delta >= SCORE_JUMP_DELTA {
            events.push(ScanEvent::ScoreJump {
                previous: prev.final_score,
                current: current.final_score,
                delta,
            });
        }
        if current.classification.rank() > prev.classification.rank() {
            events.push(ScanEvent::Upgrade {
                from: prev.classification,
                to: current.classification,
            });
        }
    }

    if let Some(move_6h) = move_6h {
        if move_6h >= IGNITION_MOVE && current.final_score >= IGNITION_MIN_SCORE {
            events.push(ScanEvent::Ignition {
                move_6h,
                score: current.final_score,
            });
        }
    }

    events
}
