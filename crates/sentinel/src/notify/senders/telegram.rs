use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{ChannelKind, Message, NotificationSender, SenderError, check_status, require};
use crate::notify::settings::NotifySettings;

const API_BASE: &str = "https://api.telegram.org";

/// A sender for pushing notifications via the Telegram Bot API.
pub struct TelegramSender {
    client: Client,
    api_base: String,
}

impl TelegramSender {
    pub fn new(client: Client) -> Self {
        Self::with_api_base(client, API_BASE)
    }

    pub fn with_api_base(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[async_trait]
impl NotificationSender for TelegramSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    async fn send(&self, settings: &NotifySettings, message: &Message) -> Result<(), SenderError> {
        let bot_token = require(self.channel(), "bot_token", &settings.telegram.bot_token)?;
        let chat_id = require(self.channel(), "chat_id", &settings.telegram.chat_id)?;

        let api_url = format!("{}/bot{bot_token}/sendMessage", self.api_base);
        let payload = TelegramMessage {
            chat_id,
            text: &message.body,
            parse_mode: "HTML",
        };

        let response = self.client.post(&api_url).json(&payload).send().await?;
        check_status(self.channel(), response).await
    }
}
