//! Notification dispatch with snooze, per-kind toggles and reminders.
//!
//! Dispatch never fails: every problem becomes a returned [`Event`] that
//! the monitor loop persists.

pub mod senders;
pub mod settings;
pub mod template;

use crate::metrics::MetricsRegistry;
use crate::types::{Event, IssueConditions, NotifyKind, TemplateVars};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub use senders::{
    ChannelKind, DiscordSender, Message, NotificationSender, NtfySender, PushoverSender,
    SenderError, TelegramSender, WebhookSender,
};
pub use settings::{NotifySettings, SettingsError};

/// Why a test notification was not delivered
#[derive(Debug, Error)]
pub enum TestError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("No sender for {0}")]
    Unavailable(ChannelKind),

    #[error(transparent)]
    Send(SenderError),
}

/// Reminder bookkeeping for one notification kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueState {
    pub last_sent_at: Option<DateTime<Utc>>,
    pub active_issue: bool,

    /// Variables of the last delivered notification, reused by reminders
    pub vars: Option<TemplateVars>,
}

/// In-memory notification state; lost on restart
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationState {
    kinds: HashMap<NotifyKind, IssueState>,
}

impl NotificationState {
    pub fn get(&self, kind: NotifyKind) -> Option<&IssueState> {
        self.kinds.get(&kind)
    }

    /// Record a delivered notification
    pub fn record_sent(&mut self, kind: NotifyKind, vars: TemplateVars, now: DateTime<Utc>) {
        let entry = self.kinds.entry(kind).or_default();
        entry.last_sent_at = Some(now);
        entry.vars = Some(vars);
    }

    pub fn set_active(&mut self, kind: NotifyKind, active: bool) {
        self.kinds.entry(kind).or_default().active_issue = active;
    }

    /// Mirror the tracker's issue conditions
    pub fn apply(&mut self, issues: &IssueConditions) {
        for kind in NotifyKind::ALL {
            self.set_active(kind, issues.is_active(kind));
        }
    }

    /// Kinds whose reminder is due at `now`
    pub fn due_reminders(&self, now: DateTime<Utc>, interval: Duration) -> Vec<(NotifyKind, TemplateVars)> {
        let Ok(interval) = chrono::Duration::from_std(interval) else {
            return Vec::new();
        };

        let mut due: Vec<_> = self
            .kinds
            .iter()
            .filter(|(_, state)| state.active_issue)
            .filter_map(|(kind, state)| {
                let last = state.last_sent_at?;
                let vars = state.vars.clone()?;
                (now - last >= interval).then_some((*kind, vars))
            })
            .collect();
        due.sort_by_key(|(kind, _)| *kind);
        due
    }
}

fn title(kind: NotifyKind, is_reminder: bool) -> String {
    let base = match kind {
        NotifyKind::Failover => "Sentinel: failover",
        NotifyKind::Recovery => "Sentinel: recovery",
        NotifyKind::Fault => "Sentinel: fault",
        NotifyKind::Startup => "Sentinel: started",
        NotifyKind::Dhcp => "Sentinel: DHCP misconfiguration",
    };
    if is_reminder {
        format!("[Reminder] {base}")
    } else {
        base.to_string()
    }
}

/// Fans rendered notifications out to the enabled channels
pub struct Dispatcher {
    settings_path: PathBuf,
    senders: Vec<Arc<dyn NotificationSender>>,
    channel_timeout: Duration,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Dispatcher {
    pub fn new(settings_path: impl Into<PathBuf>, channel_timeout: Duration) -> Self {
        Self {
            settings_path: settings_path.into(),
            senders: Vec::new(),
            channel_timeout,
            metrics: None,
        }
    }

    /// Dispatcher with every built-in channel over one shared client
    pub fn with_default_senders(
        settings_path: impl Into<PathBuf>,
        channel_timeout: Duration,
    ) -> Result<Self, SenderError> {
        let client = reqwest::Client::builder().timeout(channel_timeout).build()?;

        Ok(Self::new(settings_path, channel_timeout)
            .with_sender(Arc::new(TelegramSender::new(client.clone())))
            .with_sender(Arc::new(DiscordSender::new(client.clone())))
            .with_sender(Arc::new(PushoverSender::new(client.clone())))
            .with_sender(Arc::new(NtfySender::new(client.clone())))
            .with_sender(Arc::new(WebhookSender::new(client))))
    }

    pub fn with_sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.senders.push(sender);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Render and deliver one notification.
    ///
    /// Returns the events describing the outcome; an empty list means the
    /// notification was dropped silently (snoozed, disabled, no channels).
    pub async fn notify(
        &self,
        kind: NotifyKind,
        vars: TemplateVars,
        is_reminder: bool,
        state: &mut NotificationState,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let settings = match NotifySettings::load(&self.settings_path).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, path = %self.settings_path.display(), "Dropping notification");
                return vec![Event::warning(now, format!("{kind} notification dropped: {e}"))];
            }
        };

        if settings.is_snoozed(now) {
            debug!(%kind, "Notifications snoozed");
            return Vec::new();
        }

        if !settings.events.is_enabled(kind) {
            debug!(%kind, "Notification kind disabled");
            return Vec::new();
        }

        let template = settings
            .templates
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| template::default_template(kind));
        let body = match template::render(template, &vars) {
            Ok(body) => body,
            Err(e) => {
                let e = SenderError::TemplatingError(e);
                warn!(%kind, error = %e, "Dropping notification");
                return vec![Event::warning(now, format!("{kind} notification dropped: {e}"))];
            }
        };

        let message = Message {
            kind,
            title: title(kind, is_reminder),
            body: if is_reminder { format!("[Reminder] {body}") } else { body },
            is_reminder,
        };

        let targets: Vec<_> = self
            .senders
            .iter()
            .filter(|sender| sender.channel().is_enabled(&settings))
            .collect();
        if targets.is_empty() {
            debug!(%kind, "No notification channels enabled");
            return Vec::new();
        }

        let deliveries = targets.iter().map(|sender| {
            let settings = &settings;
            let message = &message;
            async move {
                let result = match timeout(self.channel_timeout, sender.send(settings, message)).await {
                    Ok(result) => result,
                    Err(_) => Err(SenderError::SendFailed(format!(
                        "timed out after {:?}",
                        self.channel_timeout
                    ))),
                };
                (sender.channel(), result)
            }
        });

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for (channel, result) in join_all(deliveries).await {
            if let Some(metrics) = &self.metrics {
                metrics.record_notification(channel.as_str(), if result.is_ok() { "success" } else { "failure" });
            }
            match result {
                Ok(()) => delivered.push(channel.as_str()),
                Err(e) => {
                    warn!(%channel, %kind, error = %e, "Notification delivery failed");
                    failed.push(format!("{channel} ({e})"));
                }
            }
        }

        let mut events = Vec::new();
        if !delivered.is_empty() {
            info!(%kind, channels = ?delivered, is_reminder, "Notification sent");
            state.record_sent(kind, vars, now);
            let label = if is_reminder { "reminder" } else { "notification" };
            events.push(Event::notification(
                now,
                format!("{kind} {label} sent via {}", delivered.join(", ")),
            ));
        }
        if !failed.is_empty() {
            events.push(Event::warning(
                now,
                format!("{kind} notification failed on {}", failed.join(", ")),
            ));
        }
        events
    }

    /// Send the sample message through one channel, enabled or not.
    ///
    /// Bypasses snooze, toggles and notification state.
    pub async fn send_test(&self, channel: ChannelKind) -> Result<(), TestError> {
        let settings = NotifySettings::load(&self.settings_path).await?;
        let sender = self
            .senders
            .iter()
            .find(|sender| sender.channel() == channel)
            .ok_or(TestError::Unavailable(channel))?;

        let result = match timeout(self.channel_timeout, sender.send(&settings, &Message::test())).await {
            Ok(result) => result,
            Err(_) => Err(SenderError::SendFailed(format!(
                "timed out after {:?}",
                self.channel_timeout
            ))),
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_notification(channel.as_str(), if result.is_ok() { "success" } else { "failure" });
        }

        match result {
            Ok(()) => {
                info!(%channel, "Test notification sent");
                Ok(())
            }
            Err(e) => {
                warn!(%channel, error = %e, "Test notification failed");
                Err(TestError::Send(e))
            }
        }
    }

    /// Resend notifications for issues still active past the repeat interval.
    pub async fn run_reminders(&self, state: &mut NotificationState, now: DateTime<Utc>) -> Vec<Event> {
        let settings = match NotifySettings::load(&self.settings_path).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Skipping reminders");
                return Vec::new();
            }
        };

        let Some(interval) = settings.repeat_interval() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        for (kind, vars) in state.due_reminders(now, interval) {
            debug!(%kind, "Reminder due");
            events.extend(self.notify(kind, vars, true, state, now).await);
        }
        events
    }
}
