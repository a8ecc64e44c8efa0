//! Pure feature extractors over candles and order books.
//!
//! Everything here is deterministic and allocation-light; no I/O, no clocks.
//! Extractors return `None` (or an empty summary) when the input is too thin
//! to say anything, and callers grade quality via `series_quality` /
//! `gap_quality`.

use crate::types::{BookLevel, Candle, Quality};

/// A merged order-book price cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    /// Volume-weighted price of the bucket.
    pub price: f64,
    /// Total notional in the bucket, USD.
    pub usd: f64,
}

/// Summary of one book side within a price window.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterSummary {
    pub total_usd: f64,
    pub largest_usd: f64,
    pub largest_price: f64,
}

/// Average True Range over `period` candles with Wilder's smoothing.
/// Needs `period + 1` candles; returns `None` below that.
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    for pair in candles.windows(2) {
        let (prev, current) = (&pair[0], &pair[1]);
        let hl = current.high - current.low;
        let hc = (current.high - prev.close).abs();
        let lc = (current.low - prev.close).abs();
        true_ranges.push(hl.max(hc).max(lc));
    }

    let mut atr = true_ranges.iter().take(period).sum::<f64>() / period as f64;
    for tr in true_ranges.iter().skip(period) {
        atr = (atr * (period - 1) as f64 + tr) / period as f64;
    }
    Some(atr)
}

/// Bollinger band width series over a 20-close window, and how compressed
/// the current width is: the fraction of historical widths strictly wider
/// than now (1.0 = tightest bands ever seen).
///
/// Returns `(bbw_now, compression)`. Needs at least 25 candles so the
/// percentile has a few points behind it.
pub fn bbw_compression(candles: &[Candle]) -> Option<(f64, f64)> {
    const PERIOD: usize = 20;
    if candles.len() < PERIOD + 5 {
        return None;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let mut widths = Vec::with_capacity(closes.len() - PERIOD);
    for window in closes.windows(PERIOD) {
        let mean = window.iter().sum::<f64>() / PERIOD as f64;
        if mean <= 0.0 {
            continue;
        }
        let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / PERIOD as f64;
        let std_dev = variance.sqrt();
        // BBW = (upper - lower) / middle with ±2σ bands.
        widths.push(4.0 * std_dev / mean);
    }
    if widths.len() < 5 {
        return None;
    }
    let current = *widths.last()?;
    let wider = widths.iter().filter(|w| **w > current).count();
    Some((current, wider as f64 / widths.len() as f64))
}

/// Rolling VWAP over the last `window` candles (typical price × volume).
pub fn vwap(candles: &[Candle], window: usize) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }
    let start = candles.len().saturating_sub(window);
    let mut pv = 0.0;
    let mut volume = 0.0;
    for c in &candles[start..] {
        if c.volume > 0.0 {
            pv += (c.high + c.low + c.close) / 3.0 * c.volume;
            volume += c.volume;
        }
    }
    if volume > 0.0 {
        Some(pv / volume)
    } else {
        None
    }
}

/// Lowest low over the last `lookback` candles.
pub fn swing_low(candles: &[Candle], lookback: usize) -> Option<f64> {
    let start = candles.len().saturating_sub(lookback);
    candles[start..]
        .iter()
        .map(|c| c.low)
        .filter(|l| *l > 0.0)
        .fold(None, |acc: Option<f64>, l| {
            Some(acc.map_or(l, |a| a.min(l)))
        })
}

/// Sum of candle volumes over the last `window` candles.
pub fn volume_sum(candles: &[Candle], window: usize) -> f64 {
    let start = candles.len().saturating_sub(window);
    candles[start..].iter().map(|c| c.volume).sum()
}

/// Merge one book side into price buckets of `bucket_pct` of price, keeping
/// only levels within `window_pct` of price on the relevant side.
///
/// `below` selects bids (levels under price) vs asks (levels over price).
pub fn book_clusters(
    levels: &[BookLevel],
    price: f64,
    window_pct: f64,
    bucket_pct: f64,
    below: bool,
) -> Vec<Cluster> {
    if price <= 0.0 || bucket_pct <= 0.0 {
        return Vec::new();
    }
    let bucket_size = price * bucket_pct;
    let mut buckets: std::collections::BTreeMap<i64, (f64, f64)> = std::collections::BTreeMap::new();
    for level in levels {
        let inside = if below {
            level.price < price && level.price >= price * (1.0 - window_pct)
        } else {
            level.price > price && level.price <= price * (1.0 + window_pct)
        };
        if !inside {
            continue;
        }
        let key = (level.price / bucket_size) as i64;
        let usd = level.notional();
        let entry = buckets.entry(key).or_insert((0.0, 0.0));
        entry.0 += level.price * usd;
        entry.1 += usd;
    }
    buckets
        .into_values()
        .filter(|(_, usd)| *usd > 0.0)
        .map(|(weighted, usd)| Cluster {
            price: weighted / usd,
            usd,
        })
        .collect()
}

/// Cluster summary for one side: total, largest, and the largest's price.
pub fn cluster_summary(
    levels: &[BookLevel],
    price: f64,
    window_pct: f64,
    bucket_pct: f64,
    below: bool,
) -> ClusterSummary {
    let clusters = book_clusters(levels, price, window_pct, bucket_pct, below);
    let mut summary = ClusterSummary::default();
    for c in &clusters {
        summary.total_usd += c.usd;
        if c.usd > summary.largest_usd {
            summary.largest_usd = c.usd;
            summary.largest_price = c.price;
        }
    }
    summary
}

/// Median bucket notional on one side, used to judge whether the largest
/// bid cluster is substantial enough to lean a stop on.
pub fn median_cluster_usd(clusters: &[Cluster]) -> Option<f64> {
    if clusters.is_empty() {
        return None;
    }
    let mut values: Vec<f64> = clusters.iter().map(|c| c.usd).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(values[values.len() / 2])
}

/// Ask-side walls: clusters at least 1.5× the mean bucket within
/// `window_pct` above price, ascending, at most five.
pub fn ask_walls(asks: &[BookLevel], price: f64, window_pct: f64) -> Vec<Cluster> {
    let clusters = book_clusters(asks, price, window_pct, 0.01, false);
    if clusters.is_empty() {
        return Vec::new();
    }
    let mean = clusters.iter().map(|c| c.usd).sum::<f64>() / clusters.len() as f64;
    let threshold = mean * 1.5;
    let mut walls: Vec<Cluster> = clusters.into_iter().filter(|c| c.usd >= threshold).collect();
    walls.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
    walls.truncate(5);
    walls
}

/// Grade a series by length against the lookback its consumer needs.
pub fn series_quality(len: usize, required: usize) -> Quality {
    if len >= required {
        Quality::High
    } else if len * 2 >= required {
        Quality::Med
    } else {
        Quality::Low
    }
}

/// LOW when consecutive samples are further apart than `max_gap_hours`.
pub fn gap_quality(timestamps: &[i64], max_gap_hours: i64) -> Quality {
    let max_gap_ms = max_gap_hours * 3_600_000;
    for pair in timestamps.windows(2) {
        if pair[1] - pair[0] > max_gap_ms {
            return Quality::Low;
        }
    }
    Quality::High
}
