//! Telegram sink: pushes alerts via `sendMessage` and long-polls
//! `getUpdates` for the `/trade`-family command surface.

use crate::alerts::{render_scan_alert, render_trade_notice, Alerter};
use crate::config::TelegramConfig;
use crate::error::{Result, ScanError};
use crate::types::{Alert, Command, TradeNotice};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const API_BASE: &str = "https://api.telegram.org";

/// Long-poll wait passed to getUpdates.
const POLL_TIMEOUT_S: u64 = 25;

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    text: Option<String>,
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// Telegram bot sink.
pub struct TelegramAlerter {
    client: Client,
    token: String,
    chat_id: String,
}

impl TelegramAlerter {
    pub fn new(client: Client, config: &TelegramConfig) -> Arc<Self> {
        Arc::new(Self {
            client,
            token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.token, method)
    }

    async fn post_text(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("sendMessage"))
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await
            .map_err(ScanError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::from_status(status, "telegram sendMessage"));
        }
        Ok(())
    }

    /// Long-poll for commands and forward parsed ones into `commands`.
    /// Runs until the process exits; transport errors back off and retry.
    pub async fn run_command_loop(self: Arc<Self>, commands: mpsc::UnboundedSender<Command>) {
        info!("telegram command loop started");
        let mut offset: i64 = 0;
        loop {
            let updates = self
                .client
                .get(self.url("getUpdates"))
                .query(&[
                    ("timeout", POLL_TIMEOUT_S.to_string()),
                    ("offset", offset.to_string()),
                ])
                .timeout(std::time::Duration::from_secs(POLL_TIMEOUT_S + 10))
                .send()
                .await;

            let updates: UpdatesResponse = match updates {
                Ok(response) => match response.json().await {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("getUpdates decode failed: {}", e);
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                },
                Err(e) => {
                    warn!("getUpdates failed: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };
            if !updates.ok {
                warn!("getUpdates returned ok=false");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                continue;
            }

            for update in updates.result {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else { continue };
                // Only the configured chat may drive the bot.
                if message.chat.id.to_string() != self.chat_id {
                    debug!(chat = message.chat.id, "ignoring foreign chat");
                    continue;
                }
                let Some(text) = message.text else { continue };
                if !text.starts_with('/') {
                    continue;
                }
                match Command::parse(&text) {
                    Ok(command) => {
                        if commands.send(command).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = self.post_text(&format!("⚠ {}", e)).await;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Alerter for TelegramAlerter {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send_scan_alert(&self, alert: &Alert) -> Result<()> {
        self.post_text(&render_scan_alert(alert)).await
    }

    async fn send_trade_notice(&self, notice: &TradeNotice) -> Result<()> {
        self.post_text(&render_trade_notice(notice)).await
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.post_text(text).await
    }

    async fn send_operator(&self, message: &str) -> Result<()> {
        self.post_text(&format!("⚠ operator: {}", message)).await
    }
}
