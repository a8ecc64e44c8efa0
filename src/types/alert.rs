use crate::types::market::Quality;
use crate::types::scan::{Classification, ScanEvent, ScanResult};
use crate::types::trade::{ClosedTrade, TrailRung};
use serde::{Deserialize, Serialize};

/// Severity attached to outgoing alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn for_classification(c: Classification) -> Self {
        match c {
            Classification::Critical => AlertSeverity::Critical,
            Classification::HighAlert => AlertSeverity::Warning,
            _ => AlertSeverity::Info,
        }
    }
}

/// Sink-neutral scan alert: everything a sink needs to render a full
/// breakdown, entry band, or event line for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub result: ScanResult,
    pub events: Vec<ScanEvent>,
}

impl Alert {
    pub fn new(result: ScanResult, events: Vec<ScanEvent>) -> Self {
        Self {
            severity: AlertSeverity::for_classification(result.classification),
            result,
            events,
        }
    }

    pub fn quality(&self) -> Quality {
        self.result.quality
    }
}

/// Notifications emitted by the trade monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TradeNotice {
    Registered {
        symbol: String,
        entry: f64,
        size_usd: f64,
        stop_pct: f64,
    },
    TpHit {
        symbol: String,
        level: u8,
        price: f64,
        pnl_chunk: f64,
        remaining_pct: f64,
    },
    StopMoved {
        symbol: String,
        new_stop: f64,
        stop_pct_over_entry: f64,
        reason: String,
    },
    StopHit {
        symbol: String,
        price: f64,
    },
    Degradation {
        symbol: String,
        open_score: f64,
        current_score: f64,
    },
    Closed {
        trade: ClosedTrade,
    },
    StatusDigest {
        symbol: String,
        price: f64,
        move_pct: f64,
        unrealized_pnl: f64,
        realized_pnl: f64,
        remaining_pct: f64,
        stop: f64,
        score: f64,
        hours_in: f64,
        degraded_cycle: bool,
    },
}

impl TradeNotice {
    pub fn stop_moved(symbol: &str, new_stop: f64, rung: &TrailRung, move_pct: f64) -> Self {
        TradeNotice::StopMoved {
            symbol: symbol.to_string(),
            new_stop,
            stop_pct_over_entry: rung.stop_pct,
            reason: format!("price +{:.1}%", move_pct),
        }
    }
}

/// Which trade field `/adjust` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustField {
    Stop,
    Tp1,
    Tp2,
    Tp3,
}

/// Commands arriving on a sink's return channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Trade {
        symbol: String,
        entry: f64,
        size_usd: f64,
        stop_pct: f64,
    },
    Close {
        symbol: String,
    },
    Status,
    Adjust {
        symbol: String,
        field: AdjustField,
        value: f64,
    },
    Scan,
    Watchlist,
}

impl Command {
    /// Parse a chat-style command line (`/trade WIF 2.41 500 6`).
    pub fn parse(text: &str) -> Result<Command, String> {
        let mut parts = text.split_whitespace();
        let head = parts.next().ok_or("empty command")?;
        match head {
            "/trade" => {
                let symbol = parts.next().ok_or("usage: /trade SYMBOL entry size stop_pct")?;
                let entry = parse_num(parts.next(), "entry")?;
                let size_usd = parse_num(parts.next(), "size")?;
                let stop_pct = parse_num(parts.next(), "stop_pct")?;
                if entry <= 0.0 || size_usd <= 0.0 || stop_pct <= 0.0 {
                    return Err("entry, size and stop_pct must be positive".into());
                }
                Ok(Command::Trade {
                    symbol: symbol.to_uppercase(),
                    entry,
                    size_usd,
                    stop_pct,
                })
            }
            "/close" => {
                let symbol = parts.next().ok_or("usage: /close SYMBOL")?;
                Ok(Command::Close {
                    symbol: symbol.to_uppercase(),
                })
            }
            "/status" => Ok(Command::Status),
            "/adjust" => {
                let symbol = parts.next().ok_or("usage: /adjust SYMBOL stop|tp1|tp2|tp3 value")?;
                let field = match parts.next() {
                    Some("stop") => AdjustField::Stop,
                    Some("tp1") => AdjustField::Tp1,
                    Some("tp2") => AdjustField::Tp2,
                    Some("tp3") => AdjustField::Tp3,
                    other => return Err(format!("unknown field {:?}", other)),
                };
                let value = parse_num(parts.next(), "value")?;
                Ok(Command::Adjust {
                    symbol: symbol.to_uppercase(),
                    field,
                    value,
                })
            }
            "/scan" => Ok(Command::Scan),
            "/watchlist" => Ok(Command::Watchlist),
            other => Err(format!("unknown command {}", other)),
        }
    }
}

fn parse_num(part: Option<&str>, name: &str) -> Result<f64, String> {
    part.ok_or_else(|| format!("missing {}", name))?
        .parse::<f64>()
        .map_err(|_| format!("{} must be a number", name))
}
