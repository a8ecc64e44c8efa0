use serde::{Deserialize, Serialize};

/// Stop trail schedule: once price is up `move_pct` over entry, the stop is
/// raised to `stop_pct` over entry. Percentages of entry price. The stop
/// only ever moves up.
pub const TRAIL_SCHEDULE: &[TrailRung] = &[
    TrailRung { move_pct: 5.0, stop_pct: 0.0 },
    TrailRung { move_pct: 10.0, stop_pct: 5.0 },
    TrailRung { move_pct: 15.0, stop_pct: 10.0 },
    TrailRung { move_pct: 25.0, stop_pct: 18.0 },
    TrailRung { move_pct: 40.0, stop_pct: 30.0 },
    TrailRung { move_pct: 60.0, stop_pct: 45.0 },
];

/// Fallback take-profit gains (percent over entry) used when a trade is
/// registered without smart levels available. TP4 has no fixed target: the
/// last quarter rides the trailing stop.
pub const FALLBACK_TP_PCTS: [Option<f64>; 4] = [Some(15.0), Some(30.0), Some(50.0), None];

/// Fraction of the original position sold at each take-profit.
pub const TP_SELL_FRACTION: f64 = 0.25;

#[derive(Debug, Clone, Copy)]
pub struct TrailRung {
    pub move_pct: f64,
    pub stop_pct: f64,
}

/// Why a trade left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    FullyExited,
    ManualClose,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::FullyExited => "fully_exited",
            ExitReason::ManualClose => "manual_close",
        }
    }
}

/// A position registered via `/trade`, owned by the trade monitor.
///
/// Mutated by trail rules and TP hits; destroyed by `/close`, a stop hit,
/// or full exit through the final take-profit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredTrade {
    pub symbol: String,
    pub entry: f64,
    pub size_usd: f64,
    /// Current stop price. Invariant: never decreases over the trade's life.
    pub stop: f64,
    /// Stop distance at registration, percent of entry.
    pub initial_stop_pct: f64,
    /// TP1..TP4 trigger prices. `None` for TP4 means trailing-only.
    pub tps: [Option<f64>; 4],
    pub tp_hit: [bool; 4],
    /// Index of the highest trail rung already applied, if any.
    pub trail_stage: Option<usize>,
    /// Fraction of the original position still open.
    pub remaining_fraction: f64,
    /// P&L banked by partial exits, USD.
    pub realized_pnl: f64,
    pub opened_at: i64,
    /// Composite score at registration time (degradation baseline).
    pub open_score: f64,
    pub last_score: f64,
    /// Degradation warnings already sent: [dropped ≥10, fell below watchlist].
    pub degradation_warned: [bool; 2],
    /// Last whole hour for which a status digest went out.
    pub last_status_hour: i64,
}

impl RegisteredTrade {
    pub fn new(symbol: &str, entry: f64, size_usd: f64, stop_pct: f64, opened_at: i64) -> Self {
        let tps = FALLBACK_TP_PCTS.map(|p| p.map(|pct| entry * (1.0 + pct / 100.0)));
        Self {
            symbol: symbol.to_uppercase(),
            entry,
            size_usd,
            stop: entry * (1.0 - stop_pct / 100.0),
            initial_stop_pct: stop_pct,
            tps,
            tp_hit: [false; 4],
            trail_stage: None,
            remaining_fraction: 1.0,
            realized_pnl: 0.0,
            opened_at,
            open_score: 0.0,
            last_score: 0.0,
            degradation_warned: [false; 2],
            last_status_hour: 0,
        }
    }

    /// Percent move of `price` over entry.
    pub fn move_pct(&self, price: f64) -> f64 {
        (price - self.entry) / self.entry * 100.0
    }

    /// Unrealized P&L of the remaining position at `price`, USD.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.remaining_fraction * self.size_usd * (price - self.entry) / self.entry
    }

    /// Raise the stop if any trail rung beyond the current stage is earned.
    /// Returns the newly applied rung, if the stop moved.
    pub fn apply_trail(&mut self, price: f64) -> Option<TrailRung> {
        let gain = self.move_pct(price);
        let mut applied = None;
        for (i, rung) in TRAIL_SCHEDULE.iter().enumerate() {
            let beyond_stage = self.trail_stage.map_or(true, |s| i > s);
            if gain >= rung.move_pct && beyond_stage {
                let candidate = self.entry * (1.0 + rung.stop_pct / 100.0);
                if candidate > self.stop {
                    self.stop = candidate;
                    self.trail_stage = Some(i);
                    applied = Some(*rung);
                }
            }
        }
        applied
    }
}

/// A closed trade, archived to history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub entry: f64,
    pub exit: f64,
    pub size_usd: f64,
    pub total_pnl: f64,
    pub duration_hours: f64,
    pub reason: ExitReason,
}
