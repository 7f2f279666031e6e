use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;

use super::{ChannelKind, Message, NotificationSender, SenderError, check_status, require};
use crate::notify::settings::NotifySettings;
use crate::notify::template::strip_markup;

/// A sender posting a JSON document to a custom webhook.
pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    service: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    reminder: bool,
    title: &'a str,
    message: String,
    timestamp: String,
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn send(&self, settings: &NotifySettings, message: &Message) -> Result<(), SenderError> {
        let url = require(self.channel(), "url", &settings.webhook.url)?;

        let payload = WebhookPayload {
            service: "sentinel",
            kind: message.kind.as_str(),
            reminder: message.is_reminder,
            title: &message.title,
            message: strip_markup(&message.body),
            timestamp: Utc::now().to_rfc3339(),
        };

        let response = self.client.post(url).json(&payload).send().await?;
        check_status(self.channel(), response).await
    }
}
