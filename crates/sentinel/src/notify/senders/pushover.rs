use async_trait::async_trait;
use reqwest::Client;

use super::{ChannelKind, Message, NotificationSender, SenderError, check_status, require};
use crate::notify::settings::NotifySettings;
use crate::notify::template::strip_markup;

const API_URL: &str = "https://api.pushover.net/1/messages.json";

/// A sender for the Pushover message API.
pub struct PushoverSender {
    client: Client,
    api_url: String,
}

impl PushoverSender {
    pub fn new(client: Client) -> Self {
        Self::with_api_url(client, API_URL)
    }

    pub fn with_api_url(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl NotificationSender for PushoverSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Pushover
    }

    async fn send(&self, settings: &NotifySettings, message: &Message) -> Result<(), SenderError> {
        let user_key = require(self.channel(), "user_key", &settings.pushover.user_key)?;
        let app_token = require(self.channel(), "app_token", &settings.pushover.app_token)?;

        let body = strip_markup(&message.body);
        let form = [
            ("token", app_token),
            ("user", user_key),
            ("title", message.title.as_str()),
            ("message", body.as_str()),
        ];

        let response = self.client.post(&self.api_url).form(&form).send().await?;
        check_status(self.channel(), response).await
    }
}
