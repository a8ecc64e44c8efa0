//! Scan scheduler: bounded parallel fan-out over the symbol universe with a
//! bootstrap-vs-incremental data policy and a hard per-cycle deadline.
//!
//! Per symbol and cycle: fetch from every listing venue concurrently →
//! append to the store → extract features → evaluate the nine signals →
//! score → derive levels → diff against the prior scan → alert. Partial
//! failures degrade quality; only store corruption stops the scheduler.

use crate::alerts::Alerter;
use crate::config::Config;
use crate::error::{Result, ScanError};
use crate::services::events::detect_events;
use crate::services::features::gap_quality;
use crate::services::levels::LevelsEngine;
use crate::services::scorer::Scorer;
use crate::services::signals::evaluate_all;
use crate::services::store::Store;
use crate::services::universe::UniverseBuilder;
use crate::sources::{MarketSource, SourceRegistry};
use crate::types::{
    Alert, Candle, Classification, ExchangeTicker, OrderBook, Quality, ScanEvent, ScanResult,
    SeriesKind, SymbolData, TickerData, TickerSnap,
};
use dashmap::{DashMap, DashSet};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Bootstrap history targets; a symbol below any of them is bootstrapped.
const BOOTSTRAP_OI_POINTS: usize = 200;
const BOOTSTRAP_FUNDING_POINTS: usize = 100;
const BOOTSTRAP_LS_POINTS: usize = 100;
const BOOTSTRAP_CANDLES: usize = 500;

/// Candle fetch size once a symbol has history.
const INCREMENTAL_CANDLES: usize = 72;

const BOOK_DEPTH: usize = 50;

/// The cycle must finish this long before the next tick.
const CYCLE_DEADLINE_MARGIN_S: u64 = 30;

/// Outcome of one full cycle, for logs and `run --once`.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub scanned: usize,
    pub alerted: usize,
    pub errors: usize,
    pub cancelled: bool,
    pub duration: Duration,
}

/// What one venue returned for one symbol. Any field may be absent; absence
/// degrades quality but never fails the scan.
#[derive(Default)]
struct ExchangeSlice {
    candles: Option<Vec<Candle>>,
    ticker: Option<TickerData>,
    oi: Option<f64>,
    funding: Option<f64>,
    ls: Option<f64>,
    book: Option<OrderBook>,
    failures: usize,
}

/// The scan engine's orchestrator.
pub struct Scanner {
    config: Config,
    store: Arc<Store>,
    sources: Arc<SourceRegistry>,
    universe: UniverseBuilder,
    scorer: Scorer,
    levels: LevelsEngine,
    alerters: Vec<Arc<dyn Alerter>>,
    /// Last two results per symbol; written only by the cycle, read by the
    /// event diff and the trade monitor.
    recent: DashMap<String, Vec<ScanResult>>,
    /// Symbols already bootstrapped this process.
    bootstrapped: DashSet<String>,
}

impl Scanner {
    pub fn new(
        config: Config,
        store: Arc<Store>,
        sources: Arc<SourceRegistry>,
        alerters: Vec<Arc<dyn Alerter>>,
    ) -> Arc<Self> {
        let scorer = Scorer::new(config.thresholds.clone());
        let levels = LevelsEngine::new(config.risk.clone());
        let universe = UniverseBuilder::new(store.clone());
        Arc::new(Self {
            config,
            store,
            sources,
            universe,
            scorer,
            levels,
            alerters,
            recent: DashMap::new(),
            bootstrapped: DashSet::new(),
        })
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }

    /// Newest recorded result for a symbol, if any.
    pub fn latest_result(&self, symbol: &str) -> Option<ScanResult> {
        if let Some(results) = self.recent.get(symbol) {
            if let Some(first) = results.first() {
                return Some(first.clone());
            }
        }
        self.store
            .last_scans(symbol, 1)
            .ok()
            .and_then(|mut v| v.pop())
    }

    /// Run one full scan cycle. Returns `Err` only for fatal conditions
    /// (store corruption); everything else is absorbed into the summary.
    pub async fn run_cycle(self: Arc<Self>) -> Result<CycleSummary> {
        let started = tokio::time::Instant::now();
        let now = chrono::Utc::now().timestamp_millis();

        let mut universe: Vec<(String, Vec<String>)> = self
            .universe
            .get_or_build(&self.sources, now)
            .await?
            .into_iter()
            .collect();
        universe.sort_by(|a, b| a.0.cmp(&b.0));
        universe.truncate(self.config.scan.max_symbols);
        let total = universe.len();
        info!(symbols = total, "scan cycle starting");

        let deadline = started
            + Duration::from_secs(
                self.config
                    .scan
                    .cadence_seconds
                    .saturating_sub(CYCLE_DEADLINE_MARGIN_S)
                    .max(60),
            );
        let semaphore = Arc::new(Semaphore::new(self.config.scan.concurrency));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Result<bool>>();

        let mut handles = Vec::with_capacity(total);
        for (symbol, exchanges) in universe {
            let scanner = self.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let outcome = scanner.scan_symbol(&symbol, &exchanges).await;
                if let Err(ref e) = outcome {
                    warn!(symbol = %symbol, "scan failed: {}", e);
                }
                let _ = tx.send(outcome);
            }));
        }
        drop(tx);

        let mut summary = CycleSummary::default();
        let mut fatal: Option<ScanError> = None;
        let drain = async {
            while let Some(outcome) = rx.recv().await {
                summary.scanned += 1;
                match outcome {
                    Ok(true) => summary.alerted += 1,
                    Ok(false) => {}
                    Err(e) if e.is_fatal() => {
                        fatal = Some(e);
                        return;
                    }
                    Err(_) => summary.errors += 1,
                }
                if summary.scanned % 25 == 0 || summary.scanned == total {
                    info!(
                        progress = format!("{}/{}", summary.scanned, total),
                        alerts = summary.alerted,
                        "cycle progress"
                    );
                }
            }
        };
        if tokio::time::timeout_at(deadline, drain).await.is_err() {
            warn!("cycle deadline reached, cancelling in-flight symbols");
            summary.cancelled = true;
        }
        for handle in &handles {
            handle.abort();
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        summary.duration = started.elapsed();
        info!(
            scanned = summary.scanned,
            alerts = summary.alerted,
            errors = summary.errors,
            cancelled = summary.cancelled,
            secs = summary.duration.as_secs(),
            "cycle done"
        );
        Ok(summary)
    }

    /// Scan one symbol end to end. Returns whether an alert went out.
    async fn scan_symbol(&self, symbol: &str, exchanges: &[String]) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();

        if !self.bootstrapped.contains(symbol) && self.needs_bootstrap(symbol)? {
            self.bootstrap(symbol, exchanges).await?;
            self.bootstrapped.insert(symbol.to_string());
        }

        let budget = Duration::from_secs(self.config.scan.per_symbol_timeout_s);
        let (mut data, mut quality) =
            match tokio::time::timeout(budget, self.collect(symbol, exchanges, now)).await {
                Ok(collected) => collected?,
                Err(_) => {
                    // Budget exhausted: score on stored history alone.
                    warn!(symbol, "symbol budget exhausted, using stored data only");
                    let data = SymbolData {
                        symbol: symbol.to_string(),
                        t: now,
                        ..SymbolData::default()
                    };
                    (data, Quality::Low)
                }
            };
        self.load_history(&mut data, now)?;

        if data.candles.is_empty() && data.tickers.is_empty() && data.oi_now.is_empty() {
            debug!(symbol, "no data at all, skipping");
            return Ok(false);
        }

        let candle_ts: Vec<i64> = data.candles.iter().map(|c| c.t).collect();
        quality = quality.min(gap_quality(&candle_ts, self.config.scan.max_gap_hours));
        data.quality = Some(quality);

        let signals = evaluate_all(&data);
        let return_7d = data.price_return(168);
        let mut result = self.scorer.score(symbol, now, signals, return_7d, quality);
        if result.classification.wants_levels() {
            result.levels = self.levels.compute(&data, &result);
        }

        let previous = self.previous_result(symbol);
        let events = detect_events(&result, previous.as_ref(), data.price_return(6));
        self.record(&result).await?;

        Ok(self.dispatch(&result, &events).await)
    }

    // ========== Data collection ==========

    fn needs_bootstrap(&self, symbol: &str) -> Result<bool> {
        Ok(
            self.store.count(symbol, SeriesKind::OpenInterest)? < BOOTSTRAP_OI_POINTS
                || self.store.count(symbol, SeriesKind::Funding)? < BOOTSTRAP_FUNDING_POINTS
                || self.store.count(symbol, SeriesKind::LongShort)? < BOOTSTRAP_LS_POINTS
                || self.store.count(symbol, SeriesKind::Candle)? < BOOTSTRAP_CANDLES,
        )
    }

    /// Pull deep history from every listing venue and seed the store.
    /// Venue failures are logged and skipped; store failures propagate.
    async fn bootstrap(&self, symbol: &str, exchanges: &[String]) -> Result<()> {
        info!(symbol, "bootstrapping history");
        let mut oi: BTreeMap<i64, HashMap<String, f64>> = BTreeMap::new();
        let mut funding: BTreeMap<i64, HashMap<String, f64>> = BTreeMap::new();
        let mut ls: BTreeMap<i64, HashMap<String, f64>> = BTreeMap::new();
        let mut best_candles: Vec<Candle> = Vec::new();

        for name in exchanges {
            let source = match self.sources.get(name) {
                Some(s) => s,
                None => continue,
            };
            let (oi_hist, funding_hist, ls_hist, candles) = tokio::join!(
                source.fetch_oi_history(symbol, BOOTSTRAP_OI_POINTS),
                source.fetch_funding_history(symbol, BOOTSTRAP_FUNDING_POINTS),
                source.fetch_ls_history(symbol, BOOTSTRAP_LS_POINTS),
                source.fetch_candles(symbol, BOOTSTRAP_CANDLES),
            );
            match oi_hist {
                Ok(points) => {
                    for (t, v) in points {
                        oi.entry(align_hour(t)).or_default().insert(name.clone(), v);
                    }
                }
                Err(e) => debug!(symbol, exchange = %name, "no OI history: {}", e),
            }
            match funding_hist {
                Ok(points) => {
                    for (t, v) in points {
                        funding.entry(align_hour(t)).or_default().insert(name.clone(), v);
                    }
                }
                Err(e) => debug!(symbol, exchange = %name, "no funding history: {}", e),
            }
            match ls_hist {
                Ok(points) => {
                    for (t, v) in points {
                        ls.entry(align_hour(t)).or_default().insert(name.clone(), v);
                    }
                }
                Err(e) => debug!(symbol, exchange = %name, "no L/S history: {}", e),
            }
            match candles {
                Ok(c) if c.len() > best_candles.len() => best_candles = c,
                Ok(_) => {}
                Err(e) => debug!(symbol, exchange = %name, "no candles: {}", e),
            }
        }

        let oi_rows: Vec<(i64, HashMap<String, f64>)> = oi.into_iter().collect();
        let funding_rows: Vec<(i64, HashMap<String, f64>)> = funding.into_iter().collect();
        let ls_rows: Vec<(i64, HashMap<String, f64>)> = ls.into_iter().collect();
        self.store
            .append_batch(symbol, SeriesKind::OpenInterest, &oi_rows)?;
        self.store
            .append_batch(symbol, SeriesKind::Funding, &funding_rows)?;
        self.store.append_batch(symbol, SeriesKind::LongShort, &ls_rows)?;
        self.store.append_candles(symbol, &best_candles)?;
        info!(
            symbol,
            oi = oi_rows.len(),
            funding = funding_rows.len(),
            ls = ls_rows.len(),
            candles = best_candles.len(),
            "bootstrap stored"
        );
        Ok(())
    }

    /// Fetch the live view from every venue concurrently and persist it.
    async fn collect(
        &self,
        symbol: &str,
        exchanges: &[String],
        now: i64,
    ) -> Result<(SymbolData, Quality)> {
        let mut data = SymbolData {
            symbol: symbol.to_string(),
            t: now,
            ..SymbolData::default()
        };

        let sources: Vec<&Arc<dyn MarketSource>> = exchanges
            .iter()
            .filter_map(|name| self.sources.get(name))
            .collect();
        let slices = futures_util::future::join_all(
            sources
                .iter()
                .map(|source| self.collect_exchange(source.as_ref(), symbol)),
        )
        .await;

        let mut quality = Quality::High;
        let mut any_data = false;
        for (source, slice) in sources.iter().zip(slices) {
            let name = source.name().to_string();
            if slice.failures > 0 {
                quality = quality.min(Quality::Med);
            }
            if let Some(candles) = slice.candles {
                if candles.len() > data.candles.len() {
                    data.candles = candles;
                }
                any_data = true;
            }
            if let Some(ticker) = slice.ticker {
                data.tickers.insert(name.clone(), ticker);
                any_data = true;
            }
            if let Some(oi) = slice.oi {
                data.oi_now.insert(name.clone(), oi);
                any_data = true;
            }
            if let Some(rate) = slice.funding {
                data.funding_now.insert(name.clone(), rate);
            }
            if let Some(ratio) = slice.ls {
                data.ls_now.insert(name.clone(), ratio);
            }
            if let Some(book) = slice.book {
                data.books.insert(name, book);
            }
        }
        if !any_data {
            quality = Quality::Low;
        }

        // Snapshot writes get one retry; committed appends survive even if
        // the rest of the symbol's scan is later cancelled.
        match self.persist_collected(&data, now) {
            Err(ScanError::StoreIo(first)) => {
                warn!(symbol, "snapshot write failed, retrying: {}", first);
                self.persist_collected(&data, now)?;
            }
            other => other?,
        }
        Ok((data, quality))
    }

    /// All six live fetches for one venue, concurrently.
    async fn collect_exchange(&self, source: &dyn MarketSource, symbol: &str) -> ExchangeSlice {
        let (candles, ticker, oi, funding, book, ls) = tokio::join!(
            source.fetch_candles(symbol, INCREMENTAL_CANDLES),
            source.fetch_ticker(symbol),
            source.fetch_open_interest(symbol),
            source.fetch_funding_rate(symbol),
            source.fetch_order_book(symbol, BOOK_DEPTH),
            source.fetch_ls_ratio(symbol),
        );
        let mut slice = ExchangeSlice::default();
        let exchange = source.name();
        slice.candles = absorb(candles, &mut slice.failures, exchange, symbol, "candles");
        slice.ticker = absorb(ticker, &mut slice.failures, exchange, symbol, "ticker");
        slice.oi = absorb(oi, &mut slice.failures, exchange, symbol, "oi");
        slice.funding = absorb(funding, &mut slice.failures, exchange, symbol, "funding");
        slice.book = absorb(book, &mut slice.failures, exchange, symbol, "book");
        slice.ls = absorb(ls, &mut slice.failures, exchange, symbol, "ls");
        slice
    }

    /// Append the collected snapshot to the store and enforce caps.
    /// Hour-aligned timestamps keep the snapshot series on the same hourly
    /// grid the bootstrap wrote, so re-scans within an hour replace rather
    /// than accumulate.
    fn persist_collected(&self, data: &SymbolData, now: i64) -> Result<()> {
        let symbol = &data.symbol;
        let hour = align_hour(now);

        if !data.candles.is_empty() {
            self.store.append_candles(symbol, &data.candles)?;
        }
        if !data.oi_now.is_empty() {
            self.store.append_oi(symbol, hour, &data.oi_now)?;
        }
        if !data.funding_now.is_empty() {
            self.store.append_funding(symbol, hour, &data.funding_now)?;
        }
        if !data.ls_now.is_empty() {
            self.store.append_ls(symbol, hour, &data.ls_now)?;
        }
        if !data.tickers.is_empty() {
            let per_exchange: HashMap<String, ExchangeTicker> = data
                .tickers
                .iter()
                .map(|(name, t)| {
                    (name.clone(), ExchangeTicker { price: t.price, vol24: t.volume_24h })
                })
                .collect();
            let price = data.price().unwrap_or(0.0);
            let vol24: f64 = data.tickers.values().map(|t| t.volume_24h).sum();
            let (bid, ask) = data
                .tickers
                .values()
                .next()
                .map(|t| (t.bid, t.ask))
                .unwrap_or((None, None));
            self.store.append_ticker(
                symbol,
                &TickerSnap { t: now, price, vol24, bid, ask, per_exchange },
            )?;
        }
        for kind in SeriesKind::ALL {
            self.store.cap(symbol, kind)?;
        }
        Ok(())
    }

    /// Fill the bundle's history windows from the store.
    fn load_history(&self, data: &mut SymbolData, now: i64) -> Result<()> {
        let hour = 3_600_000;
        // Stored candles extend whatever the live fetch returned.
        let stored = self.store.candles(&data.symbol, BOOTSTRAP_CANDLES)?;
        if stored.len() > data.candles.len() {
            data.candles = stored;
        }
        data.oi_history = self.store.oi_since(&data.symbol, now - 74 * hour)?;
        data.funding_history = self.store.funding_since(&data.symbol, now - 73 * hour)?;
        data.ls_history = self.store.ls_since(&data.symbol, now - 73 * hour)?;
        data.ticker_history = self.store.tickers_since(&data.symbol, now - 168 * hour)?;
        Ok(())
    }

    // ========== Results, events, alerts ==========

    fn previous_result(&self, symbol: &str) -> Option<ScanResult> {
        self.latest_result(symbol)
    }

    /// Persist and cache a result. One retry on I/O errors; on repeated
    /// failure the cycle degrades and the operator hears about it.
    async fn record(&self, result: &ScanResult) -> Result<()> {
        let outcome = match self.store.record_scan(result) {
            Err(ScanError::StoreIo(first)) => {
                warn!(symbol = %result.symbol, "scan write failed, retrying: {}", first);
                self.store.record_scan(result)
            }
            other => other,
        };
        if let Err(ScanError::StoreIo(e)) = &outcome {
            for alerter in &self.alerters {
                let _ = alerter
                    .send_operator(&format!("store writes failing: {}", e))
                    .await;
            }
        }
        outcome?;

        let mut entry = self.recent.entry(result.symbol.clone()).or_default();
        entry.insert(0, result.clone());
        entry.truncate(2);
        Ok(())
    }

    /// Alert routing per classification and events. MONITOR and below are
    /// persisted silently; events go out whenever the score is live.
    async fn dispatch(&self, result: &ScanResult, events: &[ScanEvent]) -> bool {
        let min_rank = self
            .config
            .alerts
            .min_classification
            .rank()
            .max(Classification::Watchlist.rank());
        let scan_worthy = result.classification.rank() >= min_rank;
        let event_worthy =
            !events.is_empty() && result.final_score >= self.config.thresholds.watchlist;
        if !scan_worthy && !event_worthy {
            return false;
        }

        let alert = Alert::new(result.clone(), events.to_vec());
        for alerter in &self.alerters {
            if let Err(e) = alerter.send_scan_alert(&alert).await {
                warn!(sink = alerter.name(), symbol = %result.symbol, "alert failed: {}", e);
            }
        }
        true
    }
}

fn align_hour(t: i64) -> i64 {
    t - t.rem_euclid(3_600_000)
}

fn absorb<T>(
    result: Result<T>,
    failures: &mut usize,
    exchange: &str,
    symbol: &str,
    what: &str,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            *failures += 1;
            debug!(exchange, symbol, what, "fetch absent: {}", e);
            None
        }
    }
}
