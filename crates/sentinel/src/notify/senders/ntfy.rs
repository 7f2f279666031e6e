use async_trait::async_trait;
use reqwest::Client;

use super::{ChannelKind, Message, NotificationSender, SenderError, check_status, require};
use crate::notify::settings::NotifySettings;
use crate::notify::template::strip_markup;
use crate::types::NotifyKind;

fn priority(kind: NotifyKind) -> &'static str {
    match kind {
        NotifyKind::Failover | NotifyKind::Fault => "high",
        NotifyKind::Dhcp => "default",
        NotifyKind::Recovery | NotifyKind::Startup => "low",
    }
}

/// A sender publishing to an ntfy topic.
pub struct NtfySender {
    client: Client,
}

impl NtfySender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationSender for NtfySender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Ntfy
    }

    async fn send(&self, settings: &NotifySettings, message: &Message) -> Result<(), SenderError> {
        let server = require(self.channel(), "server", &settings.ntfy.server)?;
        let topic = require(self.channel(), "topic", &settings.ntfy.topic)?;

        let url = format!("{}/{topic}", server.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Title", message.title.as_str())
            .header("Priority", priority(message.kind))
            .header("Tags", message.kind.as_str())
            .body(strip_markup(&message.body))
            .send()
            .await?;
        check_status(self.channel(), response).await
    }
}
