//! Core types shared by the tracker, store, dispatcher and reporting API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use vip::NodeRole;

/// Named values substituted into notification templates
pub type TemplateVars = BTreeMap<String, String>;

/// Kind of a persisted event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Info,
    Warning,
    Success,
    Failover,
    Error,
    Notification,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Info => "info",
            EventKind::Warning => "warning",
            EventKind::Success => "success",
            EventKind::Failover => "failover",
            EventKind::Error => "error",
            EventKind::Notification => "notification",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(EventKind::Info),
            "warning" => Ok(EventKind::Warning),
            "success" => Ok(EventKind::Success),
            "failover" => Ok(EventKind::Failover),
            "error" => Ok(EventKind::Error),
            "notification" => Ok(EventKind::Notification),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// Durable record of something state-worthy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "type")]
    pub kind: EventKind,

    pub message: String,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind,
            message: message.into(),
        }
    }

    pub fn info(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(timestamp, EventKind::Info, message)
    }

    pub fn warning(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(timestamp, EventKind::Warning, message)
    }

    pub fn success(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(timestamp, EventKind::Success, message)
    }

    pub fn failover(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(timestamp, EventKind::Failover, message)
    }

    pub fn error(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(timestamp, EventKind::Error, message)
    }

    pub fn notification(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(timestamp, EventKind::Notification, message)
    }
}

/// Per-node columns of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub role: NodeRole,
    pub online: bool,
    pub service: bool,
    pub dns: bool,
    pub dhcp: bool,
}

/// One persisted row per tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub timestamp: DateTime<Utc>,
    pub primary: NodeStatus,
    pub secondary: NodeStatus,
    pub primary_has_vip: bool,
    pub secondary_has_vip: bool,

    /// Leases handed out by the current master
    pub dhcp_leases: u64,
}

/// Notification event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    Failover,
    Recovery,
    Fault,
    Startup,
    Dhcp,
}

impl NotifyKind {
    pub const ALL: [NotifyKind; 5] = [
        NotifyKind::Failover,
        NotifyKind::Recovery,
        NotifyKind::Fault,
        NotifyKind::Startup,
        NotifyKind::Dhcp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyKind::Failover => "failover",
            NotifyKind::Recovery => "recovery",
            NotifyKind::Fault => "fault",
            NotifyKind::Startup => "startup",
            NotifyKind::Dhcp => "dhcp",
        }
    }
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification the tracker wants dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NotifyKind,
    pub vars: TemplateVars,
}

impl Notice {
    pub fn new<'a>(kind: NotifyKind, vars: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        Self {
            kind,
            vars: vars
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        }
    }
}

/// Which notification kinds currently describe an unresolved problem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueConditions {
    pub failover: bool,
    pub fault: bool,
    pub dhcp: bool,
}

impl IssueConditions {
    /// Whether `kind` has an active issue; kinds that never persist are false
    pub fn is_active(&self, kind: NotifyKind) -> bool {
        match kind {
            NotifyKind::Failover => self.failover,
            NotifyKind::Fault => self.fault,
            NotifyKind::Dhcp => self.dhcp,
            NotifyKind::Recovery | NotifyKind::Startup => false,
        }
    }
}
