use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{ChannelKind, Message, NotificationSender, SenderError, check_status, require};
use crate::notify::settings::NotifySettings;
use crate::notify::template::to_markdown;
use crate::types::NotifyKind;

/// Embed colour per kind
fn color(kind: NotifyKind) -> u32 {
    match kind {
        NotifyKind::Failover => 0xF1C40F,
        NotifyKind::Recovery => 0x2ECC71,
        NotifyKind::Fault => 0xE74C3C,
        NotifyKind::Startup => 0x3498DB,
        NotifyKind::Dhcp => 0xE67E22,
    }
}

/// A sender for Discord webhooks; markup is converted to Markdown.
pub struct DiscordSender {
    client: Client,
}

impl DiscordSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationSender for DiscordSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Discord
    }

    async fn send(&self, settings: &NotifySettings, message: &Message) -> Result<(), SenderError> {
        let url = require(self.channel(), "webhook_url", &settings.discord.webhook_url)?;

        let payload = json!({
            "embeds": [{
                "title": message.title,
                "description": to_markdown(&message.body),
                "color": color(message.kind),
                "footer": {"text": "Sentinel HA Monitor"},
            }]
        });

        let response = self.client.post(url).json(&payload).send().await?;
        check_status(self.channel(), response).await
    }
}
