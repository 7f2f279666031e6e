//! Dispatcher policy chain with fake channels and on-disk settings

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sentinel::notify::settings::NotifySettings;
use sentinel::notify::{
    ChannelKind, Dispatcher, Message, NotificationSender, NotificationState, SenderError,
};
use sentinel::types::{EventKind, IssueConditions, NotifyKind, TemplateVars};
use sentinel::MetricsRegistry;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every message; optionally fails or stalls
struct FakeSender {
    channel: ChannelKind,
    outcome: Outcome,
    sent: Mutex<Vec<Message>>,
}

#[derive(Clone, Copy)]
enum Outcome {
    Deliver,
    Fail,
    Stall,
}

impl FakeSender {
    fn new(channel: ChannelKind, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            channel,
            outcome,
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for FakeSender {
    fn channel(&self) -> ChannelKind {
        self.channel
    }

    async fn send(&self, _settings: &NotifySettings, message: &Message) -> Result<(), SenderError> {
        self.sent.lock().unwrap().push(message.clone());
        match self.outcome {
            Outcome::Deliver => Ok(()),
            Outcome::Fail => Err(SenderError::SendFailed("503 Service Unavailable".to_string())),
            Outcome::Stall => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
        }
    }
}

fn write_settings(path: &Path, settings: serde_json::Value) {
    std::fs::write(path, settings.to_string()).unwrap();
}

fn ntfy_and_webhook(extra: serde_json::Value) -> serde_json::Value {
    let mut settings = serde_json::json!({
        "ntfy": {"enabled": true, "topic": "pihole"},
        "webhook": {"enabled": true, "url": "http://hooks.local/x"}
    });
    if let (Some(base), Some(extra)) = (settings.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    settings
}

fn failover_vars() -> TemplateVars {
    [
        ("new_master", "Secondary"),
        ("old_master", "Primary"),
        ("reason", "offline"),
        ("vip", "10.0.0.100"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

struct Harness {
    _dir: tempfile::TempDir,
    dispatcher: Dispatcher,
    ntfy: Arc<FakeSender>,
    webhook: Arc<FakeSender>,
    metrics: Arc<MetricsRegistry>,
}

fn harness(settings: serde_json::Value, webhook: Outcome) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notify_settings.json");
    write_settings(&path, settings);

    let ntfy = FakeSender::new(ChannelKind::Ntfy, Outcome::Deliver);
    let webhook = FakeSender::new(ChannelKind::Webhook, webhook);
    let telegram = FakeSender::new(ChannelKind::Telegram, Outcome::Deliver);
    let metrics = Arc::new(MetricsRegistry::new());

    let dispatcher = Dispatcher::new(path, Duration::from_millis(200))
        .with_sender(ntfy.clone())
        .with_sender(webhook.clone())
        .with_sender(telegram)
        .with_metrics(metrics.clone());

    Harness {
        _dir: dir,
        dispatcher,
        ntfy,
        webhook,
        metrics,
    }
}

#[tokio::test]
async fn test_delivers_to_enabled_channels_only() {
    let h = harness(ntfy_and_webhook(serde_json::json!({})), Outcome::Deliver);
    let mut state = NotificationState::default();
    let now = Utc::now();

    let events = h
        .dispatcher
        .notify(NotifyKind::Failover, failover_vars(), false, &mut state, now)
        .await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Notification);
    assert_eq!(events[0].message, "failover notification sent via ntfy, webhook");

    let sent = h.ntfy.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("Secondary is now MASTER for 10.0.0.100"));
    assert!(!sent[0].is_reminder);

    let issue = state.get(NotifyKind::Failover).unwrap();
    assert_eq!(issue.last_sent_at, Some(now));
    assert_eq!(issue.vars, Some(failover_vars()));
}

#[tokio::test]
async fn test_snooze_drops_everything() {
    let until = (Utc::now() + ChronoDuration::hours(1)).to_rfc3339();
    let h = harness(
        ntfy_and_webhook(serde_json::json!({"snooze": {"until": until}})),
        Outcome::Deliver,
    );
    let mut state = NotificationState::default();

    let events = h
        .dispatcher
        .notify(NotifyKind::Failover, failover_vars(), false, &mut state, Utc::now())
        .await;

    assert!(events.is_empty());
    assert!(h.ntfy.sent().is_empty());
    assert!(h.webhook.sent().is_empty());
    assert!(state.get(NotifyKind::Failover).is_none());
}

#[tokio::test]
async fn test_disabled_kind_is_silent() {
    let h = harness(
        ntfy_and_webhook(serde_json::json!({"events": {"recovery": false}})),
        Outcome::Deliver,
    );
    let mut state = NotificationState::default();
    let vars = TemplateVars::from([
        ("node".to_string(), "Primary".to_string()),
        ("status".to_string(), "back online".to_string()),
    ]);

    let events = h
        .dispatcher
        .notify(NotifyKind::Recovery, vars, false, &mut state, Utc::now())
        .await;

    assert!(events.is_empty());
    assert!(h.ntfy.sent().is_empty());
}

#[tokio::test]
async fn test_missing_template_variable_is_a_warning() {
    let h = harness(
        ntfy_and_webhook(serde_json::json!({
            "templates": {"failover": "{{ new_master }} took over from {{ nobody }}"}
        })),
        Outcome::Deliver,
    );
    let mut state = NotificationState::default();

    let events = h
        .dispatcher
        .notify(NotifyKind::Failover, failover_vars(), false, &mut state, Utc::now())
        .await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Warning);
    assert!(events[0].message.starts_with("failover notification dropped"));
    assert!(h.ntfy.sent().is_empty());
    assert!(state.get(NotifyKind::Failover).is_none());
}

#[tokio::test]
async fn test_malformed_settings_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notify_settings.json");
    std::fs::write(&path, "{ not json").unwrap();

    let ntfy = FakeSender::new(ChannelKind::Ntfy, Outcome::Deliver);
    let dispatcher = Dispatcher::new(&path, Duration::from_secs(1)).with_sender(ntfy.clone());
    let mut state = NotificationState::default();

    let events = dispatcher
        .notify(NotifyKind::Failover, failover_vars(), false, &mut state, Utc::now())
        .await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Warning);
    assert!(ntfy.sent().is_empty());
}

#[tokio::test]
async fn test_missing_settings_file_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ntfy = FakeSender::new(ChannelKind::Ntfy, Outcome::Deliver);
    let dispatcher =
        Dispatcher::new(dir.path().join("absent.json"), Duration::from_secs(1)).with_sender(ntfy.clone());
    let mut state = NotificationState::default();

    let events = dispatcher
        .notify(NotifyKind::Failover, failover_vars(), false, &mut state, Utc::now())
        .await;

    assert!(events.is_empty());
    assert!(ntfy.sent().is_empty());
}

#[tokio::test]
async fn test_partial_failure_reports_both() {
    let h = harness(ntfy_and_webhook(serde_json::json!({})), Outcome::Fail);
    let mut state = NotificationState::default();

    let events = h
        .dispatcher
        .notify(NotifyKind::Failover, failover_vars(), false, &mut state, Utc::now())
        .await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EventKind::Notification);
    assert_eq!(events[0].message, "failover notification sent via ntfy");
    assert_eq!(events[1].kind, EventKind::Warning);
    assert!(events[1].message.contains("webhook"));
    assert!(events[1].message.contains("503"));
    assert!(state.get(NotifyKind::Failover).unwrap().last_sent_at.is_some());

    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, &h.metrics.registry).unwrap();
    assert!(buffer.contains(r#"sentinel_notifications_total{channel="webhook",result="failure"} 1"#));
    assert!(buffer.contains(r#"sentinel_notifications_total{channel="ntfy",result="success"} 1"#));
}

#[tokio::test]
async fn test_stalled_channel_times_out_without_blocking_others() {
    let h = harness(ntfy_and_webhook(serde_json::json!({})), Outcome::Stall);
    let mut state = NotificationState::default();

    let started = std::time::Instant::now();
    let events = h
        .dispatcher
        .notify(NotifyKind::Failover, failover_vars(), false, &mut state, Utc::now())
        .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(events.len(), 2);
    assert!(events[1].message.contains("timed out"));
}

#[tokio::test]
async fn test_all_channels_failing_records_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notify_settings.json");
    write_settings(&path, serde_json::json!({"webhook": {"enabled": true}}));

    let webhook = FakeSender::new(ChannelKind::Webhook, Outcome::Fail);
    let dispatcher = Dispatcher::new(&path, Duration::from_secs(1)).with_sender(webhook);
    let mut state = NotificationState::default();

    let events = dispatcher
        .notify(NotifyKind::Failover, failover_vars(), false, &mut state, Utc::now())
        .await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Warning);
    assert!(state.get(NotifyKind::Failover).is_none());
}

#[tokio::test]
async fn test_reminder_cadence() {
    let h = harness(
        ntfy_and_webhook(serde_json::json!({"repeat": {"interval_minutes": 30}})),
        Outcome::Deliver,
    );
    let mut state = NotificationState::default();
    let sent_at = Utc::now();

    h.dispatcher
        .notify(NotifyKind::Failover, failover_vars(), false, &mut state, sent_at)
        .await;
    state.apply(&IssueConditions {
        failover: true,
        ..Default::default()
    });

    let early = sent_at + ChronoDuration::minutes(30) - ChronoDuration::seconds(1);
    assert!(h.dispatcher.run_reminders(&mut state, early).await.is_empty());
    assert_eq!(h.ntfy.sent().len(), 1);

    let due = sent_at + ChronoDuration::minutes(30);
    let events = h.dispatcher.run_reminders(&mut state, due).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message, "failover reminder sent via ntfy, webhook");

    let sent = h.ntfy.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].is_reminder);
    assert!(sent[1].title.starts_with("[Reminder]"));
    assert!(sent[1].body.starts_with("[Reminder] "));

    // Cadence restarts from the reminder
    assert!(h.dispatcher.run_reminders(&mut state, due).await.is_empty());

    state.apply(&IssueConditions::default());
    let much_later = due + ChronoDuration::hours(5);
    assert!(h.dispatcher.run_reminders(&mut state, much_later).await.is_empty());
}

#[tokio::test]
async fn test_reminders_off_without_interval() {
    let h = harness(ntfy_and_webhook(serde_json::json!({})), Outcome::Deliver);
    let mut state = NotificationState::default();
    let sent_at = Utc::now();

    h.dispatcher
        .notify(NotifyKind::Fault, TemplateVars::from([
            ("node".to_string(), "Primary".to_string()),
            ("problem".to_string(), "went offline".to_string()),
        ]), false, &mut state, sent_at)
        .await;
    state.set_active(NotifyKind::Fault, true);

    let events = h
        .dispatcher
        .run_reminders(&mut state, sent_at + ChronoDuration::days(1))
        .await;
    assert!(events.is_empty());
    assert_eq!(h.ntfy.sent().len(), 1);
}

#[tokio::test]
async fn test_settings_reread_between_dispatches() {
    let h = harness(ntfy_and_webhook(serde_json::json!({})), Outcome::Deliver);
    let mut state = NotificationState::default();

    h.dispatcher
        .notify(NotifyKind::Failover, failover_vars(), false, &mut state, Utc::now())
        .await;
    assert_eq!(h.webhook.sent().len(), 1);

    write_settings(
        h.dispatcher.settings_path(),
        serde_json::json!({"ntfy": {"enabled": true, "topic": "pihole"}}),
    );

    h.dispatcher
        .notify(NotifyKind::Failover, failover_vars(), false, &mut state, Utc::now())
        .await;
    assert_eq!(h.ntfy.sent().len(), 2);
    assert_eq!(h.webhook.sent().len(), 1);
}
