//! Console sink: renders alerts to stdout.

use crate::alerts::{render_scan_alert, render_trade_notice, Alerter};
use crate::error::Result;
use crate::types::{Alert, TradeNotice};
use async_trait::async_trait;

/// Stdout alert sink.
pub struct ConsoleAlerter;

#[async_trait]
impl Alerter for ConsoleAlerter {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn send_scan_alert(&self, alert: &Alert) -> Result<()> {
        println!("{}", render_scan_alert(alert));
        Ok(())
    }

    async fn send_trade_notice(&self, notice: &TradeNotice) -> Result<()> {
        println!("{}", render_trade_notice(notice));
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        println!("{}", text);
        Ok(())
    }

    async fn send_operator(&self, message: &str) -> Result<()> {
        eprintln!("[operator] {}", message);
        Ok(())
    }
}
