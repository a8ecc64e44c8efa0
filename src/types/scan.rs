use crate::types::market::Quality;
use serde::{Deserialize, Serialize};

/// The nine accumulation signals, in scoring-weight order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    OiSurge,
    FundingRate,
    LiquidationLeverage,
    CrossExchangeVolume,
    DepthImbalance,
    VolumePriceDecouple,
    VolatilityCompression,
    LongShortRatio,
    FuturesVolumeDivergence,
}

impl SignalKind {
    pub const ALL: [SignalKind; 9] = [
        SignalKind::OiSurge,
        SignalKind::FundingRate,
        SignalKind::LiquidationLeverage,
        SignalKind::CrossExchangeVolume,
        SignalKind::DepthImbalance,
        SignalKind::VolumePriceDecouple,
        SignalKind::VolatilityCompression,
        SignalKind::LongShortRatio,
        SignalKind::FuturesVolumeDivergence,
    ];

    /// Composite weight. Sums to exactly 1.00 across all nine.
    pub fn weight(&self) -> f64 {
        match self {
            SignalKind::OiSurge => 0.18,
            SignalKind::FundingRate => 0.17,
            SignalKind::LiquidationLeverage => 0.15,
            SignalKind::CrossExchangeVolume => 0.12,
            SignalKind::DepthImbalance => 0.11,
            SignalKind::VolumePriceDecouple => 0.08,
            SignalKind::VolatilityCompression => 0.08,
            SignalKind::LongShortRatio => 0.06,
            SignalKind::FuturesVolumeDivergence => 0.05,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::OiSurge => "oi_surge",
            SignalKind::FundingRate => "funding_rate",
            SignalKind::LiquidationLeverage => "liquidation_leverage",
            SignalKind::CrossExchangeVolume => "cross_exchange_volume",
            SignalKind::DepthImbalance => "depth_imbalance",
            SignalKind::VolumePriceDecouple => "volume_price_decouple",
            SignalKind::VolatilityCompression => "volatility_compression",
            SignalKind::LongShortRatio => "long_short_ratio",
            SignalKind::FuturesVolumeDivergence => "futures_volume_divergence",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluated signal: normalized score, the raw measurement behind it,
/// and how trustworthy the inputs were.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    /// Normalized score in [0, 100].
    pub score: f64,
    /// Raw value along the signal's documented axis (ratio, rate, ...).
    pub raw: f64,
    pub quality: Quality,
}

impl Signal {
    pub fn new(kind: SignalKind, score: f64, raw: f64, quality: Quality) -> Self {
        Self {
            kind,
            score: score.clamp(0.0, 100.0),
            raw,
            quality,
        }
    }

    /// The zero signal emitted when an evaluator has nothing to work with
    /// (or crashed; the scan continues either way).
    pub fn empty(kind: SignalKind) -> Self {
        Self {
            kind,
            score: 0.0,
            raw: 0.0,
            quality: Quality::Low,
        }
    }
}

/// Alert classification derived from the final composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    None,
    Monitor,
    Watchlist,
    HighAlert,
    Critical,
}

impl Classification {
    /// Rank used for upgrade comparison; strictly greater means upgraded.
    pub fn rank(&self) -> u8 {
        match self {
            Classification::None => 0,
            Classification::Monitor => 1,
            Classification::Watchlist => 2,
            Classification::HighAlert => 3,
            Classification::Critical => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::None => "NONE",
            Classification::Monitor => "MONITOR",
            Classification::Watchlist => "WATCHLIST",
            Classification::HighAlert => "HIGH_ALERT",
            Classification::Critical => "CRITICAL",
        }
    }

    /// Whether smart levels are computed for this class.
    pub fn wants_levels(&self) -> bool {
        matches!(
            self,
            Classification::Critical | Classification::HighAlert | Classification::Watchlist
        )
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the winning stop candidate was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMethod {
    Atr,
    SwingLow,
    BookSupport,
}

impl StopMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopMethod::Atr => "atr",
            StopMethod::SwingLow => "swing_low",
            StopMethod::BookSupport => "book_support",
        }
    }
}

/// Chosen stop level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopLevel {
    pub price: f64,
    /// Fractional distance below current price, clamped to [0.025, 0.15].
    pub pct: f64,
    pub method: StopMethod,
}

/// Entry band with the preferred fill inside it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EntryZone {
    pub low: f64,
    pub high: f64,
    pub ideal: f64,
}

/// One staggered take-profit (25% of the position each).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TakeProfit {
    pub level: u8,
    pub price: f64,
    /// Fractional gain over current price.
    pub pct: f64,
    /// True when the level was pulled down under an ask cluster.
    pub snapped: bool,
}

/// Full set of adaptive trade levels for an alerted symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartLevels {
    pub price: f64,
    pub atr: f64,
    pub stop: StopLevel,
    pub entry: EntryZone,
    /// TP1..TP3; TP4 is the trailing directive below.
    pub take_profits: Vec<TakeProfit>,
    /// TP4: trail the remaining quarter by this fraction of price.
    pub trail_pct: f64,
    /// (TP1 - price) / (price - stop).
    pub risk_reward: f64,
    /// account * risk_pct / stop_pct.
    pub position_size_usd: f64,
    pub quality: Quality,
}

/// Cross-scan events detected by diffing adjacent results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanEvent {
    ScoreJump {
        previous: f64,
        current: f64,
        delta: f64,
    },
    Upgrade {
        from: Classification,
        to: Classification,
    },
    Ignition {
        move_6h: f64,
        score: f64,
    },
}

/// Result of scoring one symbol in one cycle. Persisted so the next cycle's
/// event detector can diff against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub symbol: String,
    pub t: i64,
    pub base_score: f64,
    pub final_score: f64,
    pub classification: Classification,
    pub signals: Vec<Signal>,
    pub bonuses_applied: Vec<String>,
    pub penalty_applied: bool,
    pub levels: Option<SmartLevels>,
    pub quality: Quality,
}

impl ScanResult {
    /// Score of one signal by kind, 0 when absent.
    pub fn signal_score(&self, kind: SignalKind) -> f64 {
        self.signals
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| s.score)
            .unwrap_or(0.0)
    }
}
