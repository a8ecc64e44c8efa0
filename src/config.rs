use crate::error::{Result, ScanError};
use crate::types::Classification;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration, loaded from a JSON file. Every section has
/// working defaults so a minimal config only needs the exchange list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchanges: Vec<ExchangeConfig>,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
}

/// One exchange credential entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub name: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_cadence")]
    pub cadence_seconds: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_symbol_timeout")]
    pub per_symbol_timeout_s: u64,
    #[serde(default = "default_max_symbols")]
    pub max_symbols: usize,
    /// Series gaps beyond this many hours degrade feature quality to LOW.
    #[serde(default = "default_max_gap_hours")]
    pub max_gap_hours: i64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            cadence_seconds: default_cadence(),
            concurrency: default_concurrency(),
            per_symbol_timeout_s: default_symbol_timeout(),
            max_symbols: default_max_symbols(),
            max_gap_hours: default_max_gap_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_min_classification")]
    pub min_classification: Classification,
    #[serde(default = "default_sinks")]
    pub sinks: Vec<String>,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            min_classification: default_min_classification(),
            sinks: default_sinks(),
            telegram: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_account")]
    pub account_usd: f64,
    #[serde(default = "default_risk_pct")]
    pub risk_pct: f64,
    #[serde(default = "default_max_open_trades")]
    pub max_open_trades: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            account_usd: default_account(),
            risk_pct: default_risk_pct(),
            max_open_trades: default_max_open_trades(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            retention_days: default_retention_days(),
        }
    }
}

/// Classification cutoffs and bonus activation minima, overridable from the
/// config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_critical")]
    pub critical: f64,
    #[serde(default = "default_high_alert")]
    pub high_alert: f64,
    #[serde(default = "default_watchlist")]
    pub watchlist: f64,
    #[serde(default = "default_monitor")]
    pub monitor: f64,
    #[serde(default = "default_squeeze_min")]
    pub squeeze_min: f64,
    #[serde(default = "default_cascade_min")]
    pub cascade_min: f64,
    #[serde(default = "default_accumulation_min")]
    pub accumulation_min: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            critical: default_critical(),
            high_alert: default_high_alert(),
            watchlist: default_watchlist(),
            monitor: default_monitor(),
            squeeze_min: default_squeeze_min(),
            cascade_min: default_cascade_min(),
            accumulation_min: default_accumulation_min(),
        }
    }
}

impl Thresholds {
    /// Map a final score to its classification.
    pub fn classify(&self, score: f64) -> Classification {
        if score >= self.critical {
            Classification::Critical
        } else if score >= self.high_alert {
            Classification::HighAlert
        } else if score >= self.watchlist {
            Classification::Watchlist
        } else if score >= self.monitor {
            Classification::Monitor
        } else {
            Classification::None
        }
    }
}

impl Config {
    /// Load and validate a config file. Any failure here is a startup abort.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ScanError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| ScanError::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.enabled_exchanges().next().is_none() {
            return Err(ScanError::Config("no enabled exchanges".into()));
        }
        if self.scan.concurrency == 0 {
            return Err(ScanError::Config("scan.concurrency must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.risk.risk_pct) {
            return Err(ScanError::Config("risk.risk_pct must be in (0, 1]".into()));
        }
        let t = &self.thresholds;
        if !(t.critical > t.high_alert && t.high_alert > t.watchlist && t.watchlist > t.monitor) {
            return Err(ScanError::Config(
                "thresholds must be strictly decreasing critical > high_alert > watchlist > monitor"
                    .into(),
            ));
        }
        Ok(())
    }

    pub fn enabled_exchanges(&self) -> impl Iterator<Item = &ExchangeConfig> {
        self.exchanges.iter().filter(|e| e.enabled)
    }

    /// Write a starter config with the known exchanges disabled.
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Config {
            exchanges: ["binance", "bybit"]
                .iter()
                .map(|name| ExchangeConfig {
                    name: name.to_string(),
                    api_key: None,
                    api_secret: None,
                    enabled: true,
                })
                .collect(),
            ..Config::default()
        };
        let text = serde_json::to_string_pretty(&config)
            .map_err(|e| ScanError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), text).map_err(|e| {
            ScanError::Config(format!("cannot write {}: {}", path.as_ref().display(), e))
        })?;
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_cadence() -> u64 {
    900
}
fn default_concurrency() -> usize {
    6
}
fn default_symbol_timeout() -> u64 {
    30
}
fn default_max_symbols() -> usize {
    400
}
fn default_max_gap_hours() -> i64 {
    3
}
fn default_min_classification() -> Classification {
    Classification::Watchlist
}
fn default_sinks() -> Vec<String> {
    vec!["console".to_string()]
}
fn default_account() -> f64 {
    10_000.0
}
fn default_risk_pct() -> f64 {
    0.02
}
fn default_max_open_trades() -> usize {
    3
}
fn default_store_path() -> String {
    "data/prowl.db".to_string()
}
fn default_retention_days() -> i64 {
    30
}
fn default_critical() -> f64 {
    78.0
}
fn default_high_alert() -> f64 {
    62.0
}
fn default_watchlist() -> f64 {
    48.0
}
fn default_monitor() -> f64 {
    33.0
}
fn default_squeeze_min() -> f64 {
    45.0
}
fn default_cascade_min() -> f64 {
    40.0
}
fn default_accumulation_min() -> f64 {
    40.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scan.cadence_seconds, 900);
        assert_eq!(config.scan.concurrency, 6);
        assert_eq!(config.scan.per_symbol_timeout_s, 30);
        assert_eq!(config.risk.risk_pct, 0.02);
        assert_eq!(config.risk.max_open_trades, 3);
        assert_eq!(config.store.retention_days, 30);
        assert_eq!(
            config.alerts.min_classification,
            Classification::Watchlist
        );
    }

    #[test]
    fn test_minimal_json() {
        let json = r#"{"exchanges": [{"name": "binance"}]}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.exchanges[0].enabled);
        assert_eq!(config.thresholds.critical, 78.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_threshold_classify() {
        let t = Thresholds::default();
        assert_eq!(t.classify(89.5), Classification::Critical);
        assert_eq!(t.classify(78.0), Classification::Critical);
        assert_eq!(t.classify(77.9), Classification::HighAlert);
        assert_eq!(t.classify(53.7), Classification::Watchlist);
        assert_eq!(t.classify(40.0), Classification::Monitor);
        assert_eq!(t.classify(26.5), Classification::None);
    }

    #[test]
    fn test_validation_rejects_bad_thresholds() {
        let json = r#"{
            "exchanges": [{"name": "binance"}],
            "thresholds": {"critical": 50, "high_alert": 62}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_requires_exchange() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }
}
