//! Trade monitor: five-minute price polls over registered positions, with
//! the trail schedule, take-profit hits, degradation warnings and hourly
//! status digests.

use crate::alerts::Alerter;
use crate::config::RiskConfig;
use crate::error::{Result, ScanError};
use crate::services::store::Store;
use crate::sources::SourceRegistry;
use crate::types::{
    AdjustField, ClosedTrade, ExitReason, Quality, RegisteredTrade, TradeNotice, TP_SELL_FRACTION,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Score drop since entry that triggers the first degradation warning.
const DEGRADATION_DROP: f64 = 10.0;

/// Monitors and mutates registered trades. Runs on its own 5-minute tick,
/// independent of scan cycles.
pub struct TradeMonitor {
    store: Arc<Store>,
    sources: Arc<SourceRegistry>,
    alerters: Vec<Arc<dyn Alerter>>,
    risk: RiskConfig,
    /// Score floor below which a position's thesis is considered gone.
    watchlist_threshold: f64,
}

impl TradeMonitor {
    pub fn new(
        store: Arc<Store>,
        sources: Arc<SourceRegistry>,
        alerters: Vec<Arc<dyn Alerter>>,
        risk: RiskConfig,
        watchlist_threshold: f64,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            sources,
            alerters,
            risk,
            watchlist_threshold,
        })
    }

    // ========== Command surface ==========

    /// `/trade S entry size stop_pct`
    pub async fn register(
        &self,
        symbol: &str,
        entry: f64,
        size_usd: f64,
        stop_pct: f64,
    ) -> Result<()> {
        let active = self.store.active_trades()?;
        if active.len() >= self.risk.max_open_trades {
            return Err(ScanError::Internal(format!(
                "max open trades reached ({})",
                self.risk.max_open_trades
            )));
        }
        let now = chrono::Utc::now().timestamp_millis();
        let mut trade = RegisteredTrade::new(symbol, entry, size_usd, stop_pct, now);

        // Seed TPs and the degradation baseline from the latest scan.
        if let Some(result) = self.store.last_scans(&trade.symbol, 1)?.pop() {
            trade.open_score = result.final_score;
            trade.last_score = result.final_score;
            if let Some(levels) = &result.levels {
                for (i, tp) in levels.take_profits.iter().enumerate().take(3) {
                    trade.tps[i] = Some(tp.price);
                }
            }
        }

        self.store.upsert_trade(&trade)?;
        info!(symbol = %trade.symbol, entry, size_usd, stop_pct, "trade registered");
        self.notify(&TradeNotice::Registered {
            symbol: trade.symbol.clone(),
            entry,
            size_usd,
            stop_pct,
        })
        .await;
        Ok(())
    }

    /// `/close S`: close at the live price (or entry when unavailable).
    pub async fn close(&self, symbol: &str) -> Result<Option<ClosedTrade>> {
        let symbol = symbol.to_uppercase();
        let trade = match self.store.get_trade(&symbol)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let price = self.live_price(&symbol).await.unwrap_or(trade.entry);
        let closed = self.close_at(&trade, price, ExitReason::ManualClose).await?;
        Ok(Some(closed))
    }

    /// `/adjust S stop|tp1|tp2|tp3 value`
    pub async fn adjust(&self, symbol: &str, field: AdjustField, value: f64) -> Result<()> {
        let symbol = symbol.to_uppercase();
        let mut trade = self
            .store
            .get_trade(&symbol)?
            .ok_or_else(|| ScanError::Internal(format!("no active trade for {}", symbol)))?;
        match field {
            AdjustField::Stop => {
                // Manual adjustments still respect trail monotonicity.
                if value <= trade.stop {
                    return Err(ScanError::Internal(format!(
                        "stop can only move up (current {:.6})",
                        trade.stop
                    )));
                }
                trade.stop = value;
            }
            AdjustField::Tp1 => trade.tps[0] = Some(value),
            AdjustField::Tp2 => trade.tps[1] = Some(value),
            AdjustField::Tp3 => trade.tps[2] = Some(value),
        }
        self.store.upsert_trade(&trade)?;
        info!(symbol = %symbol, ?field, value, "trade adjusted");
        Ok(())
    }

    /// `/status`: one digest notice per open trade, on demand.
    pub async fn send_status(&self) -> Result<usize> {
        let trades = self.store.active_trades()?;
        let now = chrono::Utc::now().timestamp_millis();
        for trade in &trades {
            let price = match self.live_price(&trade.symbol).await {
                Some(p) => p,
                None => continue,
            };
            self.notify(&self.digest(trade, price, now)).await;
        }
        Ok(trades.len())
    }

    // ========== Periodic tick ==========

    /// One monitoring pass over every registered trade.
    pub async fn tick(&self) {
        let trades = match self.store.active_trades() {
            Ok(trades) => trades,
            Err(e) => {
                warn!("cannot read trades: {}", e);
                return;
            }
        };
        for trade in trades {
            if let Err(e) = self.check_trade(trade).await {
                warn!("trade check failed: {}", e);
            }
        }
    }

    async fn check_trade(&self, mut trade: RegisteredTrade) -> Result<()> {
        let symbol = trade.symbol.clone();
        if trade.remaining_fraction <= 0.0 {
            let price = self.live_price(&symbol).await.unwrap_or(trade.entry);
            self.close_at(&trade, price, ExitReason::FullyExited).await?;
            return Ok(());
        }

        let price = match self.live_price(&symbol).await {
            Some(p) => p,
            None => return Ok(()),
        };
        let now = chrono::Utc::now().timestamp_millis();

        // Stop first: a hit ends the trade regardless of anything else.
        if price <= trade.stop {
            self.notify(&TradeNotice::StopHit { symbol: symbol.clone(), price })
                .await;
            self.close_at(&trade, price, ExitReason::StopLoss).await?;
            return Ok(());
        }

        // Take-profit hits, each at most once, 25% of the position apiece.
        let mut dirty = false;
        for i in 0..trade.tps.len() {
            let target = match trade.tps[i] {
                Some(t) => t,
                None => continue,
            };
            if trade.tp_hit[i] || price < target {
                continue;
            }
            let pnl_chunk =
                TP_SELL_FRACTION * trade.size_usd * (price - trade.entry) / trade.entry;
            trade.tp_hit[i] = true;
            trade.remaining_fraction = (trade.remaining_fraction - TP_SELL_FRACTION).max(0.0);
            trade.realized_pnl += pnl_chunk;
            dirty = true;
            self.notify(&TradeNotice::TpHit {
                symbol: symbol.clone(),
                level: (i + 1) as u8,
                price,
                pnl_chunk,
                remaining_pct: trade.remaining_fraction * 100.0,
            })
            .await;
        }
        if trade.remaining_fraction <= 0.0 {
            self.close_at(&trade, price, ExitReason::FullyExited).await?;
            return Ok(());
        }

        // Trail schedule: stop only ever moves up.
        if let Some(rung) = trade.apply_trail(price) {
            dirty = true;
            self.notify(&TradeNotice::stop_moved(
                &symbol,
                trade.stop,
                &rung,
                trade.move_pct(price),
            ))
            .await;
        }

        // Degradation against the score at entry, one warning per rule.
        if let Some(result) = self.store.last_scans(&symbol, 1)?.pop() {
            let current = result.final_score;
            if !trade.degradation_warned[0]
                && trade.open_score > 0.0
                && current <= trade.open_score - DEGRADATION_DROP
            {
                trade.degradation_warned[0] = true;
                dirty = true;
                self.notify(&TradeNotice::Degradation {
                    symbol: symbol.clone(),
                    open_score: trade.open_score,
                    current_score: current,
                })
                .await;
            }
            if !trade.degradation_warned[1] && current < self.watchlist_threshold {
                trade.degradation_warned[1] = true;
                dirty = true;
                self.notify(&TradeNotice::Degradation {
                    symbol: symbol.clone(),
                    open_score: trade.open_score,
                    current_score: current,
                })
                .await;
            }
            if (trade.last_score - current).abs() > f64::EPSILON {
                trade.last_score = current;
                dirty = true;
            }
        }

        // Hourly digest.
        let hours_in = ((now - trade.opened_at) / 3_600_000).max(0);
        if hours_in > trade.last_status_hour {
            trade.last_status_hour = hours_in;
            dirty = true;
            self.notify(&self.digest(&trade, price, now)).await;
        }

        if dirty {
            self.store.upsert_trade(&trade)?;
        }
        Ok(())
    }

    // ========== Helpers ==========

    async fn close_at(
        &self,
        trade: &RegisteredTrade,
        price: f64,
        reason: ExitReason,
    ) -> Result<ClosedTrade> {
        let now = chrono::Utc::now().timestamp_millis();
        let closed = ClosedTrade {
            symbol: trade.symbol.clone(),
            entry: trade.entry,
            exit: price,
            size_usd: trade.size_usd,
            total_pnl: trade.realized_pnl + trade.unrealized_pnl(price),
            duration_hours: (now - trade.opened_at) as f64 / 3_600_000.0,
            reason,
        };
        self.store.archive_trade(&closed, now)?;
        info!(
            symbol = %closed.symbol,
            pnl = format!("{:.2}", closed.total_pnl),
            reason = reason.as_str(),
            "trade closed"
        );
        self.notify(&TradeNotice::Closed { trade: closed.clone() }).await;
        Ok(closed)
    }

    fn digest(&self, trade: &RegisteredTrade, price: f64, now: i64) -> TradeNotice {
        let (score, degraded) = self
            .store
            .last_scans(&trade.symbol, 1)
            .ok()
            .and_then(|mut v| v.pop())
            .map(|r| (r.final_score, r.quality == Quality::Low))
            .unwrap_or((0.0, true));
        TradeNotice::StatusDigest {
            symbol: trade.symbol.clone(),
            price,
            move_pct: trade.move_pct(price),
            unrealized_pnl: trade.unrealized_pnl(price),
            realized_pnl: trade.realized_pnl,
            remaining_pct: trade.remaining_fraction * 100.0,
            stop: trade.stop,
            score,
            hours_in: (now - trade.opened_at) as f64 / 3_600_000.0,
            degraded_cycle: degraded,
        }
    }

    /// Latest tradable price from any venue.
    async fn live_price(&self, symbol: &str) -> Option<f64> {
        for source in self.sources.iter() {
            match source.fetch_ticker(symbol).await {
                Ok(ticker) if ticker.price > 0.0 => return Some(ticker.price),
                Ok(_) => {}
                Err(e) => {
                    warn!(symbol, exchange = source.name(), "ticker failed: {}", e);
                }
            }
        }
        None
    }

    async fn notify(&self, notice: &TradeNotice) {
        for alerter in &self.alerters {
            if let Err(e) = alerter.send_trade_notice(notice).await {
                warn!(sink = alerter.name(), "trade notice failed: {}", e);
            }
        }
    }
}
