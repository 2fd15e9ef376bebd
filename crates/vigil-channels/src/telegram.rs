//! Telegram Bot messenger — sends proactive check-ins via `sendMessage`.

use async_trait::async_trait;
use serde::Deserialize;
use vigil_core::config::TelegramConfig;
use vigil_core::error::{Result, VigilError};
use vigil_core::traits::Messenger;

/// Outbound-only Telegram client.
pub struct TelegramMessenger {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramMessenger {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            api_base: "https://api.telegram.org".into(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different Bot API server (self-hosted or test).
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }
}

/// Numeric chat ids go out as numbers, `@channel` names as strings.
fn chat_id_value(target_id: &str) -> serde_json::Value {
    match target_id.trim().parse::<i64>() {
        Ok(id) => serde_json::json!(id),
        Err(_) => serde_json::json!(target_id.trim()),
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_message(&self, target_id: &str, text: &str) -> Result<String> {
        let body = serde_json::json!({
            "chat_id": chat_id_value(target_id),
            "text": text,
        });

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| VigilError::Channel(format!("sendMessage failed: {e}")))?;

        let result: TelegramApiResponse<SentMessage> = response
            .json()
            .await
            .map_err(|e| VigilError::Channel(format!("Invalid send response: {e}")))?;

        let id = sent_message_id(result)?;
        tracing::debug!("✉️ Telegram message {id} sent to {target_id}");
        Ok(id)
    }
}

fn sent_message_id(result: TelegramApiResponse<SentMessage>) -> Result<String> {
    if !result.ok {
        return Err(VigilError::Channel(format!(
            "Send failed: {}",
            result.description.unwrap_or_default()
        )));
    }
    result
        .result
        .map(|m| m.message_id.to_string())
        .ok_or_else(|| VigilError::Channel("Send response had no message".into()))
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}
