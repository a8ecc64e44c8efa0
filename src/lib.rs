//! prowl: pre-pump accumulation scanner for crypto perpetual futures.
//!
//! Periodically ingests market microstructure from multiple venues, scores
//! nine accumulation signals per symbol into a classified composite,
//! derives adaptive trade levels, and emits alerts. A separate monitor
//! trails registered positions.

pub mod alerts;
pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

pub use config::Config;
pub use error::{Result, ScanError};
