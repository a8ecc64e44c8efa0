pub mod alert;
pub mod market;
pub mod scan;
pub mod trade;

pub use alert::{AdjustField, Alert, AlertSeverity, Command, TradeNotice};
pub use market::{
    BookLevel, Candle, ExchangeTicker, FundingPoint, LsPoint, OiPoint, OrderBook, Quality,
    SeriesKind, SymbolData, TickerData, TickerSnap,
};
pub use scan::{
    Classification, EntryZone, ScanEvent, ScanResult, Signal, SignalKind, SmartLevels, StopLevel,
    StopMethod, TakeProfit,
};
pub use trade::{
    ClosedTrade, ExitReason, RegisteredTrade, TrailRung, FALLBACK_TP_PCTS, TP_SELL_FRACTION,
    TRAIL_SCHEDULE,
};
