//! SQLite persistence layer: per-(symbol, kind) sample series, scan results,
//! registered trades, and the cached symbol universe.
//!
//! The interface is pure value semantics: callers hand in and get back owned
//! typed samples; all SQL stays behind this module. Appends are idempotent on
//! timestamp: re-inserting the same `(symbol, kind, t)` replaces the payload.

use crate::error::{Result, ScanError};
use crate::types::{
    Candle, ClosedTrade, FundingPoint, LsPoint, OiPoint, RegisteredTrade, ScanResult, SeriesKind,
    TickerSnap,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Current schema version. Migrations are forward-only and idempotent.
const SCHEMA_VERSION: i64 = 1;

/// Row counts and file size, for the `run --stats` surface.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub series_rows: usize,
    pub scan_results: usize,
    pub active_trades: usize,
    pub closed_trades: usize,
    pub universe_symbols: usize,
    pub file_size_bytes: u64,
}

/// Embedded time-series store.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<String>,
}

impl Store {
    /// Open (or create) the store at `path`, running pending migrations and
    /// a quick integrity check.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| ScanError::StoreIo(format!("mkdir {}: {}", dir.display(), e)))?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.as_ref().to_string_lossy().into_owned()),
        };
        store.init()?;
        info!(path = %path.as_ref().display(), "store opened");
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.init()?;
        debug!("in-memory store opened");
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = self.lock();
        // journal_mode replies with the resulting mode, so it needs a query.
        conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0))?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;

        let ok: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
        if ok != "ok" {
            return Err(ScanError::StoreCorruption(format!(
                "integrity check failed: {}",
                ok
            )));
        }

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS series (
                    symbol TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    t INTEGER NOT NULL,
                    payload TEXT NOT NULL,
                    PRIMARY KEY (symbol, kind, t)
                );
                CREATE INDEX IF NOT EXISTS idx_series_kind_t ON series(kind, t);
                CREATE TABLE IF NOT EXISTS scan_results (
                    symbol TEXT NOT NULL,
                    t INTEGER NOT NULL,
                    final_score REAL NOT NULL,
                    payload TEXT NOT NULL,
                    PRIMARY KEY (symbol, t)
                );
                CREATE TABLE IF NOT EXISTS trades (
                    symbol TEXT PRIMARY KEY,
                    payload TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS trade_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    symbol TEXT NOT NULL,
                    closed_at INTEGER NOT NULL,
                    payload TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS universe (
                    symbol TEXT PRIMARY KEY,
                    exchanges TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );",
            )?;
        }
        if version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            info!(from = version, to = SCHEMA_VERSION, "store schema migrated");
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means a panic mid-statement; continuing with the
        // connection is still sound for SQLite.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========== Generic series access ==========

    /// Append one sample, replacing any existing payload at the same `t`.
    pub fn append<T: Serialize>(
        &self,
        symbol: &str,
        kind: SeriesKind,
        t: i64,
        sample: &T,
    ) -> Result<()> {
        let payload = serde_json::to_string(sample)?;
        self.lock().execute(
            "INSERT INTO series (symbol, kind, t, payload) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(symbol, kind, t) DO UPDATE SET payload = excluded.payload",
            params![symbol, kind.as_str(), t, payload],
        )?;
        Ok(())
    }

    /// Append many samples in one transaction.
    pub fn append_batch<T: Serialize>(
        &self,
        symbol: &str,
        kind: SeriesKind,
        samples: &[(i64, T)],
    ) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(ScanError::from)?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO series (symbol, kind, t, payload) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(symbol, kind, t) DO UPDATE SET payload = excluded.payload",
            )?;
            for (t, sample) in samples {
                let payload = serde_json::to_string(sample)?;
                stmt.execute(params![symbol, kind.as_str(), t, payload])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Samples in `[t_from, t_to]`, ascending in t.
    pub fn range<T: DeserializeOwned>(
        &self,
        symbol: &str,
        kind: SeriesKind,
        t_from: i64,
        t_to: i64,
    ) -> Result<Vec<(i64, T)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT t, payload FROM series
             WHERE symbol = ?1 AND kind = ?2 AND t >= ?3 AND t <= ?4
             ORDER BY t ASC",
        )?;
        let rows = stmt.query_map(params![symbol, kind.as_str(), t_from, t_to], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        decode_rows(rows)
    }

    /// Last `n` samples, returned ascending in t.
    pub fn latest<T: DeserializeOwned>(
        &self,
        symbol: &str,
        kind: SeriesKind,
        n: usize,
    ) -> Result<Vec<(i64, T)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT t, payload FROM series
             WHERE symbol = ?1 AND kind = ?2
             ORDER BY t DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![symbol, kind.as_str(), n as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut decoded = decode_rows(rows)?;
        decoded.reverse();
        Ok(decoded)
    }

    /// Number of stored samples for this series.
    pub fn count(&self, symbol: &str, kind: SeriesKind) -> Result<usize> {
        let n: i64 = self.lock().query_row(
            "SELECT COUNT(*) FROM series WHERE symbol = ?1 AND kind = ?2",
            params![symbol, kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Enforce the retention cap for one series, dropping the oldest rows.
    /// Returns how many rows were removed.
    pub fn cap(&self, symbol: &str, kind: SeriesKind) -> Result<usize> {
        let removed = self.lock().execute(
            "DELETE FROM series WHERE symbol = ?1 AND kind = ?2 AND t NOT IN (
                SELECT t FROM series WHERE symbol = ?1 AND kind = ?2
                ORDER BY t DESC LIMIT ?3
            )",
            params![symbol, kind.as_str(), kind.cap() as i64],
        )?;
        Ok(removed)
    }

    // ========== Typed series wrappers ==========

    pub fn append_candles(&self, symbol: &str, candles: &[Candle]) -> Result<()> {
        let rows: Vec<(i64, &Candle)> = candles.iter().map(|c| (c.t, c)).collect();
        self.append_batch(symbol, SeriesKind::Candle, &rows)
    }

    pub fn candles(&self, symbol: &str, n: usize) -> Result<Vec<Candle>> {
        Ok(self
            .latest::<Candle>(symbol, SeriesKind::Candle, n)?
            .into_iter()
            .map(|(_, c)| c)
            .collect())
    }

    pub fn append_oi(&self, symbol: &str, t: i64, by_exchange: &HashMap<String, f64>) -> Result<()> {
        self.append(symbol, SeriesKind::OpenInterest, t, by_exchange)
    }

    pub fn oi_since(&self, symbol: &str, t_from: i64) -> Result<Vec<OiPoint>> {
        Ok(self
            .range::<HashMap<String, f64>>(symbol, SeriesKind::OpenInterest, t_from, i64::MAX)?
            .into_iter()
            .map(|(t, oi_usd)| OiPoint { t, oi_usd })
            .collect())
    }

    pub fn append_funding(
        &self,
        symbol: &str,
        t: i64,
        by_exchange: &HashMap<String, f64>,
    ) -> Result<()> {
        self.append(symbol, SeriesKind::Funding, t, by_exchange)
    }

    pub fn funding_since(&self, symbol: &str, t_from: i64) -> Result<Vec<FundingPoint>> {
        Ok(self
            .range::<HashMap<String, f64>>(symbol, SeriesKind::Funding, t_from, i64::MAX)?
            .into_iter()
            .map(|(t, rate)| FundingPoint { t, rate })
            .collect())
    }

    pub fn append_ls(&self, symbol: &str, t: i64, by_exchange: &HashMap<String, f64>) -> Result<()> {
        self.append(symbol, SeriesKind::LongShort, t, by_exchange)
    }

    pub fn ls_since(&self, symbol: &str, t_from: i64) -> Result<Vec<LsPoint>> {
        Ok(self
            .range::<HashMap<String, f64>>(symbol, SeriesKind::LongShort, t_from, i64::MAX)?
            .into_iter()
            .map(|(t, ratio)| LsPoint { t, ratio })
            .collect())
    }

    pub fn append_ticker(&self, symbol: &str, snap: &TickerSnap) -> Result<()> {
        self.append(symbol, SeriesKind::Ticker, snap.t, snap)
    }

    pub fn tickers_since(&self, symbol: &str, t_from: i64) -> Result<Vec<TickerSnap>> {
        Ok(self
            .range::<TickerSnap>(symbol, SeriesKind::Ticker, t_from, i64::MAX)?
            .into_iter()
            .map(|(_, s)| s)
            .collect())
    }

    // ========== Scan results ==========

    pub fn record_scan(&self, result: &ScanResult) -> Result<()> {
        let payload = serde_json::to_string(result)?;
        self.lock().execute(
            "INSERT INTO scan_results (symbol, t, final_score, payload) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(symbol, t) DO UPDATE SET
                final_score = excluded.final_score, payload = excluded.payload",
            params![result.symbol, result.t, result.final_score, payload],
        )?;
        Ok(())
    }

    /// Most recent `n` results for a symbol, newest first.
    pub fn last_scans(&self, symbol: &str, n: usize) -> Result<Vec<ScanResult>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT payload FROM scan_results WHERE symbol = ?1 ORDER BY t DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![symbol, n as i64], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            match serde_json::from_str::<ScanResult>(&row?) {
                Ok(r) => out.push(r),
                Err(e) => warn!(symbol, "undecodable scan result dropped: {}", e),
            }
        }
        Ok(out)
    }

    /// Latest result per symbol with `final_score >= min_score`, best first.
    pub fn top_scores(&self, min_score: f64, limit: usize) -> Result<Vec<ScanResult>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.payload FROM scan_results s
             JOIN (SELECT symbol, MAX(t) AS max_t FROM scan_results GROUP BY symbol) m
               ON s.symbol = m.symbol AND s.t = m.max_t
             WHERE s.final_score >= ?1
             ORDER BY s.final_score DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![min_score, limit as i64], |row| {
            row.get::<_, String>(0)
        })?;
        let mut out = Vec::new();
        for row in rows {
            if let Ok(r) = serde_json::from_str::<ScanResult>(&row?) {
                out.push(r);
            }
        }
        Ok(out)
    }

    // ========== Trades ==========

    pub fn upsert_trade(&self, trade: &RegisteredTrade) -> Result<()> {
        let payload = serde_json::to_string(trade)?;
        self.lock().execute(
            "INSERT INTO trades (symbol, payload) VALUES (?1, ?2)
             ON CONFLICT(symbol) DO UPDATE SET payload = excluded.payload",
            params![trade.symbol, payload],
        )?;
        Ok(())
    }

    pub fn get_trade(&self, symbol: &str) -> Result<Option<RegisteredTrade>> {
        let payload: Option<String> = self
            .lock()
            .query_row(
                "SELECT payload FROM trades WHERE symbol = ?1",
                params![symbol],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }

    pub fn active_trades(&self) -> Result<Vec<RegisteredTrade>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT payload FROM trades")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    /// Remove an active trade and archive its closing record.
    pub fn archive_trade(&self, closed: &ClosedTrade, closed_at: i64) -> Result<()> {
        let payload = serde_json::to_string(closed)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO trade_history (symbol, closed_at, payload) VALUES (?1, ?2, ?3)",
            params![closed.symbol, closed_at, payload],
        )?;
        conn.execute("DELETE FROM trades WHERE symbol = ?1", params![closed.symbol])?;
        Ok(())
    }

    // ========== Universe ==========

    /// Replace the cached symbol universe (symbol -> futures exchanges).
    pub fn store_universe(&self, universe: &HashMap<String, Vec<String>>, now: i64) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(ScanError::from)?;
        tx.execute("DELETE FROM universe", [])?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO universe (symbol, exchanges, updated_at) VALUES (?1, ?2, ?3)")?;
            for (symbol, exchanges) in universe {
                stmt.execute(params![symbol, serde_json::to_string(exchanges)?, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Cached universe with its oldest update timestamp, if any.
    pub fn load_universe(&self) -> Result<Option<(i64, HashMap<String, Vec<String>>)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT symbol, exchanges, updated_at FROM universe")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        let mut universe = HashMap::new();
        let mut oldest = i64::MAX;
        for row in rows {
            let (symbol, exchanges, updated_at) = row?;
            universe.insert(symbol, serde_json::from_str(&exchanges)?);
            oldest = oldest.min(updated_at);
        }
        if universe.is_empty() {
            Ok(None)
        } else {
            Ok(Some((oldest, universe)))
        }
    }

    // ========== Maintenance ==========

    /// Delete series samples and scan results older than `days`. Returns the
    /// number of rows removed.
    pub fn cleanup(&self, days: i64, now: i64) -> Result<usize> {
        let cutoff = now - days * 86_400_000;
        let conn = self.lock();
        let mut removed = conn.execute("DELETE FROM series WHERE t < ?1", params![cutoff])?;
        removed += conn.execute("DELETE FROM scan_results WHERE t < ?1", params![cutoff])?;
        info!(removed, days, "store cleanup");
        Ok(removed)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock();
        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as usize)
        };
        let file_size_bytes = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);
        Ok(StoreStats {
            series_rows: count("series")?,
            scan_results: count("scan_results")?,
            active_trades: count("trades")?,
            closed_trades: count("trade_history")?,
            universe_symbols: count("universe")?,
            file_size_bytes,
        })
    }
}

fn decode_rows<T: DeserializeOwned>(
    rows: impl Iterator<Item = rusqlite::Result<(i64, String)>>,
) -> Result<Vec<(i64, T)>> {
    let mut out = Vec::new();
    for row in rows {
        let (t, payload) = row?;
        match serde_json::from_str(&payload) {
            Ok(value) => out.push((t, value)),
            Err(e) => warn!(t, "undecodable series payload dropped: {}", e),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Classification, Quality};

    fn candle(t: i64, close: f64) -> Candle {
        Candle {
            t,
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn test_append_idempotent_on_t() {
        let store = Store::open_in_memory().unwrap();
        store.append_candles("WIF", &[candle(1000, 1.0)]).unwrap();
        store.append_candles("WIF", &[candle(1000, 2.0)]).unwrap();

        let candles = store.candles("WIF", 10).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, 2.0);
    }

    #[test]
    fn test_range_ascending() {
        let store = Store::open_in_memory().unwrap();
        // Insert out of order; range must come back ascending.
        store
            .append_candles("WIF", &[candle(3000, 3.0), candle(1000, 1.0), candle(2000, 2.0)])
            .unwrap();
        let rows: Vec<(i64, Candle)> = store.range("WIF", SeriesKind::Candle, 0, 9999).unwrap();
        let ts: Vec<i64> = rows.iter().map(|(t, _)| *t).collect();
        assert_eq!(ts, vec![1000, 2000, 3000]);

        let bounded: Vec<(i64, Candle)> =
            store.range("WIF", SeriesKind::Candle, 1500, 2500).unwrap();
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].0, 2000);
    }

    #[test]
    fn test_latest_returns_tail_ascending() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..10 {
            store.append_candles("WIF", &[candle(i * 1000, i as f64)]).unwrap();
        }
        let last3 = store.candles("WIF", 3).unwrap();
        assert_eq!(last3.len(), 3);
        assert_eq!(last3[0].t, 7000);
        assert_eq!(last3[2].t, 9000);
    }

    #[test]
    fn test_cap_prunes_oldest() {
        let store = Store::open_in_memory().unwrap();
        let n = SeriesKind::Funding.cap() + 25;
        for i in 0..n {
            let mut m = HashMap::new();
            m.insert("binance".to_string(), -0.0001);
            store.append_funding("WIF", i as i64 * 1000, &m).unwrap();
        }
        let removed = store.cap("WIF", SeriesKind::Funding).unwrap();
        assert_eq!(removed, 25);
        assert_eq!(store.count("WIF", SeriesKind::Funding).unwrap(), SeriesKind::Funding.cap());
        // Survivors are the newest.
        let rows = store.funding_since("WIF", 0).unwrap();
        assert_eq!(rows[0].t, 25_000);
    }

    #[test]
    fn test_scan_result_roundtrip_and_last_two() {
        let store = Store::open_in_memory().unwrap();
        for (t, score) in [(1000, 55.0), (2000, 73.0)] {
            let result = ScanResult {
                symbol: "WIF".into(),
                t,
                base_score: score,
                final_score: score,
                classification: Classification::Watchlist,
                signals: Vec::new(),
                bonuses_applied: Vec::new(),
                penalty_applied: false,
                levels: None,
                quality: Quality::High,
            };
            store.record_scan(&result).unwrap();
        }
        let scans = store.last_scans("WIF", 2).unwrap();
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].final_score, 73.0);
        assert_eq!(scans[1].final_score, 55.0);
    }

    #[test]
    fn test_trade_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let trade = RegisteredTrade::new("WIF", 2.0, 500.0, 6.0, 0);
        store.upsert_trade(&trade).unwrap();
        assert!(store.get_trade("WIF").unwrap().is_some());
        assert_eq!(store.active_trades().unwrap().len(), 1);

        let closed = ClosedTrade {
            symbol: "WIF".into(),
            entry: 2.0,
            exit: 2.4,
            size_usd: 500.0,
            total_pnl: 100.0,
            duration_hours: 12.0,
            reason: crate::types::ExitReason::ManualClose,
        };
        store.archive_trade(&closed, 1).unwrap();
        assert!(store.get_trade("WIF").unwrap().is_none());
        assert_eq!(store.stats().unwrap().closed_trades, 1);
    }

    #[test]
    fn test_universe_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let mut universe = HashMap::new();
        universe.insert("WIF".to_string(), vec!["binance".to_string(), "bybit".to_string()]);
        store.store_universe(&universe, 42).unwrap();
        let (oldest, loaded) = store.load_universe().unwrap().unwrap();
        assert_eq!(oldest, 42);
        assert_eq!(loaded["WIF"].len(), 2);
    }

    #[test]
    fn test_cleanup_by_age() {
        let store = Store::open_in_memory().unwrap();
        let day_ms = 86_400_000;
        store.append_candles("WIF", &[candle(0, 1.0), candle(40 * day_ms, 2.0)]).unwrap();
        let removed = store.cleanup(30, 40 * day_ms).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count("WIF", SeriesKind::Candle).unwrap(), 1);
    }
}
