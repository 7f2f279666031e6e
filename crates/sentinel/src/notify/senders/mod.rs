//! Delivery channels.

use super::settings::NotifySettings;
use crate::types::NotifyKind;
use async_trait::async_trait;
use reqwest::Response;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod discord;
pub mod ntfy;
pub mod pushover;
pub mod telegram;
pub mod webhook;

pub use discord::DiscordSender;
pub use ntfy::NtfySender;
pub use pushover::PushoverSender;
pub use telegram::TelegramSender;
pub use webhook::WebhookSender;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// Notification channel identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Telegram,
    Discord,
    Pushover,
    Ntfy,
    Webhook,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Telegram => "telegram",
            ChannelKind::Discord => "discord",
            ChannelKind::Pushover => "pushover",
            ChannelKind::Ntfy => "ntfy",
            ChannelKind::Webhook => "webhook",
        }
    }

    /// Channel switched on in `settings`
    pub fn is_enabled(&self, settings: &NotifySettings) -> bool {
        match self {
            ChannelKind::Telegram => settings.telegram.enabled,
            ChannelKind::Discord => settings.discord.enabled,
            ChannelKind::Pushover => settings.pushover.enabled,
            ChannelKind::Ntfy => settings.ntfy.enabled,
            ChannelKind::Webhook => settings.webhook.enabled,
        }
    }
}

impl FromStr for ChannelKind {
    type Err = SenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "telegram" => Ok(ChannelKind::Telegram),
            "discord" => Ok(ChannelKind::Discord),
            "pushover" => Ok(ChannelKind::Pushover),
            "ntfy" => Ok(ChannelKind::Ntfy),
            "webhook" => Ok(ChannelKind::Webhook),
            other => Err(SenderError::InvalidConfiguration(format!("Unknown service: {other}"))),
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered notification, markup included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: NotifyKind,
    pub title: String,
    pub body: String,
    pub is_reminder: bool,
}

impl Message {
    /// Sample message showing what each notification kind looks like
    pub fn test() -> Self {
        Self {
            kind: NotifyKind::Startup,
            title: "Sentinel: test notification".to_string(),
            body: [
                "<b>Sentinel test notification</b>",
                "",
                "<b>Failover:</b> Secondary became MASTER (reason: offline)",
                "<b>Recovery:</b> Primary is back online",
                "<b>Fault:</b> Service on Primary is down",
                "<b>DHCP:</b> Secondary is BACKUP but DHCP is ENABLED",
                "",
                "If you see this, notifications are working.",
            ]
            .join("\n"),
            is_reminder: false,
        }
    }
}

/// A trait for sending notifications to a specific channel type.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn channel(&self) -> ChannelKind;

    /// Deliver `message` using this channel's section of `settings`.
    async fn send(&self, settings: &NotifySettings, message: &Message) -> Result<(), SenderError>;
}

/// Reject empty credentials before any request is made
pub(crate) fn require<'a>(channel: ChannelKind, field: &str, value: &'a str) -> Result<&'a str, SenderError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SenderError::InvalidConfiguration(format!("{channel} {field} is not set")));
    }
    Ok(trimmed)
}

/// Map a non-success status to `SendFailed`, keeping the body for context
pub(crate) async fn check_status(channel: ChannelKind, response: Response) -> Result<(), SenderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    Err(SenderError::SendFailed(format!(
        "{channel} returned non-success status: {status}. Body: {body}"
    )))
}
