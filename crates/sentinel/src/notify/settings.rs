//! Operator-editable notification settings.
//!
//! The file is JSON and is re-read for every dispatch so edits apply on the
//! next tick without a restart.

use crate::types::NotifyKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Settings loading errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read notification settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed notification settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Per-kind enable flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventToggles {
    pub failover: bool,
    pub recovery: bool,
    pub fault: bool,
    pub startup: bool,
    pub dhcp: bool,
}

impl Default for EventToggles {
    fn default() -> Self {
        Self {
            failover: true,
            recovery: true,
            fault: true,
            startup: false,
            dhcp: true,
        }
    }
}

impl EventToggles {
    pub fn is_enabled(&self, kind: NotifyKind) -> bool {
        match kind {
            NotifyKind::Failover => self.failover,
            NotifyKind::Recovery => self.recovery,
            NotifyKind::Fault => self.fault,
            NotifyKind::Startup => self.startup,
            NotifyKind::Dhcp => self.dhcp,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnoozeSettings {
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepeatSettings {
    /// Minutes between reminders; 0 disables them
    pub interval_minutes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordSettings {
    pub enabled: bool,
    pub webhook_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushoverSettings {
    pub enabled: bool,
    pub user_key: String,
    pub app_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NtfySettings {
    pub enabled: bool,
    pub server: String,
    pub topic: String,
}

impl Default for NtfySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            server: "https://ntfy.sh".to_string(),
            topic: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub enabled: bool,
    pub url: String,
}

/// Complete notification settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub events: EventToggles,

    /// Template overrides per kind
    pub templates: BTreeMap<NotifyKind, String>,

    pub snooze: SnoozeSettings,
    pub repeat: RepeatSettings,

    pub telegram: TelegramSettings,
    pub discord: DiscordSettings,
    pub pushover: PushoverSettings,
    pub ntfy: NtfySettings,
    pub webhook: WebhookSettings,
}

impl NotifySettings {
    /// Load settings from `path`; a missing file means defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        match tokio::fs::read_to_string(path.as_ref()).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Snooze window still open at `now`
    pub fn is_snoozed(&self, now: DateTime<Utc>) -> bool {
        self.snooze.until.is_some_and(|until| now < until)
    }

    /// Reminder interval, `None` when reminders are off
    pub fn repeat_interval(&self) -> Option<Duration> {
        match self.repeat.interval_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(minutes.saturating_mul(60))),
        }
    }

    /// Copy safe to hand to the reporting API
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        mask(&mut masked.telegram.bot_token, 8, 4);
        mask(&mut masked.telegram.chat_id, 4, 4);
        mask(&mut masked.discord.webhook_url, 8, 8);
        mask(&mut masked.pushover.user_key, 8, 4);
        mask(&mut masked.pushover.app_token, 8, 4);
        mask(&mut masked.webhook.url, 8, 8);
        masked
    }
}

const MASK: char = '•';

/// Replace all but the last `keep` characters with `dots` mask characters.
/// Empty values stay empty so "not configured" remains visible.
fn mask(value: &mut String, dots: usize, keep: usize) {
    if value.is_empty() {
        return;
    }
    let chars: Vec<char> = value.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(keep)..].iter().collect();
    *value = std::iter::repeat_n(MASK, dots).chain(tail.chars()).collect();
}
