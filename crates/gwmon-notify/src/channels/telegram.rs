use crate::error::NotifyError;
use crate::{InlineAction, NotificationChannel};
use async_trait::async_trait;
use serde_json::Value;

/// Maximum characters kept from an error response body.
const MAX_ERROR_BODY_CHARS: usize = 200;

pub struct TelegramChannel {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramChannel {
    pub fn new(bot_token: &str, chat_id: &str) -> Result<Self, NotifyError> {
        if bot_token.is_empty() {
            return Err(NotifyError::InvalidConfig("empty bot token".to_string()));
        }
        if chat_id.is_empty() {
            return Err(NotifyError::InvalidConfig("empty chat_id".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_base: "https://api.telegram.org".to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        })
    }

    /// Overrides the API base URL (tests and self-hosted bot proxies).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

/// Builds the `sendMessage` payload. Separate from the channel so the
/// request shape can be verified without an HTTP round trip.
pub fn build_payload(chat_id: &str, text: &str, actions: &[InlineAction]) -> Value {
    let mut payload = serde_json::json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "HTML",
        "disable_web_page_preview": true,
    });
    if !actions.is_empty() {
        let row: Vec<Value> = actions
            .iter()
            .map(|a| {
                serde_json::json!({
                    "text": a.label,
                    "callback_data": a.callback,
                })
            })
            .collect();
        payload["reply_markup"] = serde_json::json!({ "inline_keyboard": [row] });
    }
    payload
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn send(&self, text: &str, actions: &[InlineAction]) -> Result<(), NotifyError> {
        let payload = build_payload(&self.chat_id, text, actions);
        let resp = self
            .client
            .post(self.send_url())
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::ApiError {
                service: "telegram".to_string(),
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        tracing::debug!(chat_id = %self.chat_id, "Telegram message delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "telegram"
    }
}
