//! Alert sinks: a sink-neutral structured alert, text rendering shared by
//! every sink, and the trait console/Telegram implement.

pub mod console;
pub mod telegram;

pub use console::ConsoleAlerter;
pub use telegram::TelegramAlerter;

use crate::error::Result;
use crate::types::{Alert, Classification, ScanEvent, TradeNotice};
use async_trait::async_trait;

/// A notification sink. Sinks render the structured alert however suits
/// their medium; the scan pipeline treats them interchangeably.
#[async_trait]
pub trait Alerter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Scan alert (classification + breakdown + levels + events).
    async fn send_scan_alert(&self, alert: &Alert) -> Result<()>;

    /// Trade monitor notification.
    async fn send_trade_notice(&self, notice: &TradeNotice) -> Result<()>;

    /// Plain informational text (command replies, digests).
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Operator side channel for infrastructure trouble (store failures,
    /// fatal conditions).
    async fn send_operator(&self, message: &str) -> Result<()>;
}

// ========== Formatting helpers ==========

pub fn format_price(value: f64) -> String {
    if value >= 1000.0 {
        format!("${:.2}", value)
    } else if value >= 1.0 {
        format!("${:.4}", value)
    } else if value >= 0.01 {
        format!("${:.6}", value)
    } else {
        format!("${:.8}", value)
    }
}

pub fn format_usd(value: f64) -> String {
    if value.abs() >= 1_000_000.0 {
        format!("${:.1}M", value / 1_000_000.0)
    } else if value.abs() >= 1_000.0 {
        format!("${:.1}K", value / 1_000.0)
    } else {
        format!("${:.2}", value)
    }
}

pub fn format_pct(value: f64) -> String {
    format!("{}{:.2}%", if value >= 0.0 { "+" } else { "" }, value)
}

pub fn score_bar(value: f64, width: usize) -> String {
    let filled = ((value / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

// ========== Shared text rendering ==========

/// Render a scan alert as plain text. CRITICAL and HIGH_ALERT get the full
/// breakdown plus levels; WATCHLIST gets the breakdown and the entry band
/// only; events are listed first when present.
pub fn render_scan_alert(alert: &Alert) -> String {
    let result = &alert.result;
    let mut out = String::new();

    for event in &alert.events {
        out.push_str(&render_event(&result.symbol, event));
        out.push('\n');
    }

    out.push_str(&format!(
        "{} {} score {:.1} (base {:.1}) [{}]\n",
        result.classification.as_str(),
        result.symbol,
        result.final_score,
        result.base_score,
        result.quality.as_str(),
    ));

    for signal in &result.signals {
        out.push_str(&format!(
            "  {:26} {:5.1} {}\n",
            signal.kind.as_str(),
            signal.score,
            score_bar(signal.score, 10),
        ));
    }
    if !result.bonuses_applied.is_empty() {
        out.push_str(&format!("  bonuses: {}\n", result.bonuses_applied.join(", ")));
    }
    if result.penalty_applied {
        out.push_str("  penalty: price_extended x0.60\n");
    }

    if let Some(levels) = &result.levels {
        out.push_str(&format!(
            "  entry {} – {} (ideal {})\n",
            format_price(levels.entry.low),
            format_price(levels.entry.high),
            format_price(levels.entry.ideal),
        ));
        if result.classification != Classification::Watchlist {
            out.push_str(&format!(
                "  stop {} ({:.1}%, {})\n",
                format_price(levels.stop.price),
                levels.stop.pct * 100.0,
                levels.stop.method.as_str(),
            ));
            for tp in &levels.take_profits {
                out.push_str(&format!(
                    "  tp{} {} ({}){}\n",
                    tp.level,
                    format_price(tp.price),
                    format_pct(tp.pct * 100.0),
                    if tp.snapped { " under wall" } else { "" },
                ));
            }
            out.push_str(&format!(
                "  tp4 trail {:.1}% | R:R {:.2} | size {}\n",
                levels.trail_pct * 100.0,
                levels.risk_reward,
                format_usd(levels.position_size_usd),
            ));
        }
    }

    out
}

fn render_event(symbol: &str, event: &ScanEvent) -> String {
    match event {
        ScanEvent::ScoreJump { previous, current, delta } => format!(
            "SCORE_JUMP {} {:.1} → {:.1} (+{:.1})",
            symbol, previous, current, delta
        ),
        ScanEvent::Upgrade { from, to } => {
            format!("UPGRADE {} {} → {}", symbol, from.as_str(), to.as_str())
        }
        ScanEvent::Ignition { move_6h, score } => format!(
            "IGNITION {} {} in 6h at score {:.0}",
            symbol,
            format_pct(move_6h * 100.0),
            score
        ),
    }
}

/// Render a trade notice as one line (digest: a short block).
pub fn render_trade_notice(notice: &TradeNotice) -> String {
    match notice {
        TradeNotice::Registered { symbol, entry, size_usd, stop_pct } => format!(
            "TRADE {} @ {} size {} stop {:.1}%",
            symbol,
            format_price(*entry),
            format_usd(*size_usd),
            stop_pct
        ),
        TradeNotice::TpHit { symbol, level, price, pnl_chunk, remaining_pct } => format!(
            "TP{} HIT {} @ {} | banked {} | {:.0}% left",
            level,
            symbol,
            format_price(*price),
            format_usd(*pnl_chunk),
            remaining_pct
        ),
        TradeNotice::StopMoved { symbol, new_stop, stop_pct_over_entry, reason } => format!(
            "STOP UP {} -> {} ({} over entry): {}",
            symbol,
            format_price(*new_stop),
            format_pct(*stop_pct_over_entry),
            reason
        ),
        TradeNotice::StopHit { symbol, price } => {
            format!("STOP HIT {} @ {}", symbol, format_price(*price))
        }
        TradeNotice::Degradation { symbol, open_score, current_score } => format!(
            "DEGRADATION {} score {:.1} → {:.1}",
            symbol, open_score, current_score
        ),
        TradeNotice::Closed { trade } => format!(
            "CLOSED {} @ {} | P&L {} ({}) | {:.1}h",
            trade.symbol,
            format_price(trade.exit),
            format_usd(trade.total_pnl),
            trade.reason.as_str(),
            trade.duration_hours
        ),
        TradeNotice::StatusDigest {
            symbol,
            price,
            move_pct,
            unrealized_pnl,
            realized_pnl,
            remaining_pct,
            stop,
            score,
            hours_in,
            degraded_cycle,
        } => format!(
            "STATUS {} @ {} ({}) | uP&L {} rP&L {} | {:.0}% open | stop {} | score {:.1}{} | {:.1}h",
            symbol,
            format_price(*price),
            format_pct(*move_pct),
            format_usd(*unrealized_pnl),
            format_usd(*realized_pnl),
            remaining_pct,
            format_price(*stop),
            score,
            if *degraded_cycle { " (degraded)" } else { "" },
            hours_in
        ),
    }
}
