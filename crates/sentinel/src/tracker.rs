//! State transition detection.
//!
//! [`Tracker::track`] is a pure fold step: it compares one tick's
//! observation with the previous tick and returns everything the monitor
//! loop has to persist, dispatch and remember. Nothing here performs I/O.

use crate::types::{
    Event, IssueConditions, NodeStatus, Notice, NotifyKind, StatusSnapshot, TemplateVars,
};
use chrono::{DateTime, Utc};
use prober::NodeHealth;
use vip::{ActiveRole, NodeRole, VipOwnership, VipResolution};

/// What the previous tick saw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviousTick {
    pub primary: NodeHealth,
    pub secondary: NodeHealth,
    pub ownership: VipOwnership,
    pub role: ActiveRole,

    /// A DHCP misconfiguration was already reported
    pub dhcp_reported: bool,

    /// A VIP anomaly was already reported
    pub anomaly_reported: bool,
}

/// Tracker state carried from one tick to the next
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorState {
    /// `None` until the first tick completes
    pub previous: Option<PreviousTick>,
}

/// Raw results of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub primary: NodeHealth,
    pub secondary: NodeHealth,
    pub vip: VipResolution,
}

/// Everything derived from one observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub snapshot: StatusSnapshot,
    pub events: Vec<Event>,
    pub notices: Vec<Notice>,
    pub issues: IssueConditions,
    pub next: MonitorState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Primary,
    Secondary,
}

impl Side {
    fn of(role: ActiveRole) -> Option<Side> {
        match role {
            ActiveRole::Primary => Some(Side::Primary),
            ActiveRole::Secondary => Some(Side::Secondary),
            ActiveRole::None => None,
        }
    }
}

/// Why the node that lost mastership lost it
fn failover_reason(health: Option<&NodeHealth>) -> &'static str {
    match health {
        Some(h) if !h.reachable => "offline",
        Some(h) if !h.service_up => "service down",
        _ => "unknown",
    }
}

fn ok_or_down(up: bool) -> &'static str {
    if up { "OK" } else { "Down" }
}

/// Detects transitions between consecutive observations
#[derive(Debug, Clone)]
pub struct Tracker {
    primary_name: String,
    secondary_name: String,
    vip: String,
}

struct Report {
    now: DateTime<Utc>,
    common: TemplateVars,
    events: Vec<Event>,
    notices: Vec<Notice>,
}

impl Report {
    fn notice<'a>(&mut self, kind: NotifyKind, vars: impl IntoIterator<Item = (&'a str, String)>) {
        let mut notice = Notice::new(kind, vars);
        for (key, value) in &self.common {
            notice.vars.entry(key.clone()).or_insert_with(|| value.clone());
        }
        self.notices.push(notice);
    }
}

impl Tracker {
    pub fn new(primary_name: impl Into<String>, secondary_name: impl Into<String>, vip: impl Into<String>) -> Self {
        Self {
            primary_name: primary_name.into(),
            secondary_name: secondary_name.into(),
            vip: vip.into(),
        }
    }

    pub fn primary_name(&self) -> &str {
        &self.primary_name
    }

    pub fn secondary_name(&self) -> &str {
        &self.secondary_name
    }

    /// Diff `observation` against `state` and produce this tick's outcome.
    pub fn track(&self, state: &MonitorState, observation: &Observation, now: DateTime<Utc>) -> TickOutcome {
        let ownership = observation.vip.ownership;
        let role = ownership.active_role();
        let anomaly = self.vip_anomaly(&observation.vip);
        let dhcp_issues = self.dhcp_issues(observation);

        let mut report = Report {
            now,
            common: self.common_vars(now),
            events: Vec::new(),
            notices: Vec::new(),
        };

        match &state.previous {
            None => self.startup(observation, role, &mut report),
            Some(previous) => {
                self.node_transitions(Side::Primary, &previous.primary, &observation.primary, &mut report);
                self.node_transitions(Side::Secondary, &previous.secondary, &observation.secondary, &mut report);

                if previous.role != role {
                    self.failover(previous.role, role, observation, &mut report);
                } else if previous.ownership != ownership {
                    report.events.push(Event::warning(
                        now,
                        format!(
                            "VIP switched from {} to {}",
                            self.holder(previous.ownership),
                            self.holder(ownership)
                        ),
                    ));
                }
            }
        }

        // Condition checks run every tick, the startup tick included
        let anomaly_reported = state.previous.is_some_and(|p| p.anomaly_reported);
        if let Some(message) = &anomaly {
            report.events.push(Event::warning(now, message.clone()));
            if !anomaly_reported {
                report.notice(
                    NotifyKind::Fault,
                    [("node", "VIP".to_string()), ("problem", message.clone())],
                );
            }
        }

        let dhcp_reported = state.previous.is_some_and(|p| p.dhcp_reported);
        for message in &dhcp_issues {
            report.events.push(Event::warning(now, message.clone()));
        }
        if !dhcp_issues.is_empty() && !dhcp_reported {
            report.notice(NotifyKind::Dhcp, [("message", dhcp_issues.join("\n"))]);
        }

        let next = PreviousTick {
            primary: observation.primary,
            secondary: observation.secondary,
            ownership,
            role,
            dhcp_reported: !dhcp_issues.is_empty(),
            anomaly_reported: anomaly.is_some(),
        };

        let single_owner = ownership.primary_has_vip != ownership.secondary_has_vip;
        let issues = IssueConditions {
            failover: role == ActiveRole::Secondary,
            fault: [observation.primary, observation.secondary]
                .iter()
                .any(|h| !h.reachable || !h.service_up)
                || !single_owner
                || anomaly.is_some(),
            dhcp: !dhcp_issues.is_empty(),
        };

        TickOutcome {
            snapshot: self.snapshot(observation, now),
            events: report.events,
            notices: report.notices,
            issues,
            next: MonitorState {
                previous: Some(next),
            },
        }
    }

    fn name(&self, side: Side) -> &str {
        match side {
            Side::Primary => &self.primary_name,
            Side::Secondary => &self.secondary_name,
        }
    }

    fn holder(&self, ownership: VipOwnership) -> String {
        match (ownership.primary_has_vip, ownership.secondary_has_vip) {
            (true, true) => "both nodes".to_string(),
            (true, false) => self.primary_name.clone(),
            (false, true) => self.secondary_name.clone(),
            (false, false) => "no node".to_string(),
        }
    }

    fn common_vars(&self, now: DateTime<Utc>) -> TemplateVars {
        TemplateVars::from([
            ("primary".to_string(), self.primary_name.clone()),
            ("secondary".to_string(), self.secondary_name.clone()),
            ("vip".to_string(), self.vip.clone()),
            ("time".to_string(), now.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        ])
    }

    fn startup(&self, observation: &Observation, role: ActiveRole, report: &mut Report) {
        let master = match Side::of(role) {
            Some(side) => self.name(side).to_string(),
            None => "no node".to_string(),
        };

        let headline = match Side::of(role) {
            Some(_) => format!("Monitor started - {master} is MASTER"),
            None => "Monitor started - no node holds the VIP".to_string(),
        };
        report.events.push(Event::info(report.now, headline));

        for (side, health) in [(Side::Primary, &observation.primary), (Side::Secondary, &observation.secondary)] {
            report.events.push(Event::info(
                report.now,
                format!(
                    "{}: {}, service: {}, DNS: {}",
                    self.name(side),
                    if health.reachable { "Online" } else { "Offline" },
                    ok_or_down(health.service_up),
                    ok_or_down(health.dns_works),
                ),
            ));
        }

        report.notice(NotifyKind::Startup, [("master", master)]);
    }

    fn node_transitions(&self, side: Side, previous: &NodeHealth, current: &NodeHealth, report: &mut Report) {
        let name = self.name(side).to_string();

        if previous.reachable != current.reachable {
            if current.reachable {
                report.events.push(Event::success(report.now, format!("{name} is back ONLINE")));
                report.notice(NotifyKind::Recovery, [("node", name), ("status", "back online".to_string())]);
            } else {
                report.events.push(Event::warning(report.now, format!("{name} went OFFLINE")));
                report.notice(NotifyKind::Fault, [("node", name), ("problem", "went offline".to_string())]);
            }
        } else if current.reachable && previous.service_up != current.service_up {
            if current.service_up {
                report.events.push(Event::success(report.now, format!("Service on {name} is back UP")));
                report.notice(NotifyKind::Recovery, [("node", name), ("status", "service back up".to_string())]);
            } else {
                report.events.push(Event::warning(report.now, format!("Service on {name} is DOWN")));
                report.notice(NotifyKind::Fault, [("node", name), ("problem", "service is down".to_string())]);
            }
        }
    }

    fn failover(&self, previous: ActiveRole, current: ActiveRole, observation: &Observation, report: &mut Report) {
        let loser = Side::of(previous);
        let loser_health = loser.map(|side| match side {
            Side::Primary => &observation.primary,
            Side::Secondary => &observation.secondary,
        });
        let reason = failover_reason(loser_health).to_string();
        let old_master = loser.map_or("no node", |side| self.name(side)).to_string();

        match Side::of(current) {
            Some(side) => {
                let new_master = self.name(side).to_string();
                report.events.push(Event::failover(
                    report.now,
                    format!("{new_master} became MASTER (reason: {reason})"),
                ));
                report.notice(
                    NotifyKind::Failover,
                    [("new_master", new_master), ("old_master", old_master), ("reason", reason)],
                );
            }
            None => {
                report.events.push(Event::failover(
                    report.now,
                    format!("{old_master} lost the VIP and no node is MASTER (reason: {reason})"),
                ));
                report.notice(
                    NotifyKind::Fault,
                    [("node", old_master), ("problem", format!("VIP has no owner ({reason})"))],
                );
            }
        }
    }

    fn vip_anomaly(&self, resolution: &VipResolution) -> Option<String> {
        if resolution.ownership.is_split_brain() {
            Some(format!(
                "VIP anomaly: both {} and {} hold the VIP (split-brain)",
                self.primary_name, self.secondary_name
            ))
        } else if resolution.shared_lladdr {
            Some(format!(
                "VIP anomaly: {} and {} share the VIP's link-layer address, assuming {}",
                self.primary_name, self.secondary_name, self.primary_name
            ))
        } else {
            None
        }
    }

    /// DHCP must run on the master only. A node whose API is down reports
    /// DHCP as disabled, so a master in that state is flagged too.
    fn dhcp_issues(&self, observation: &Observation) -> Vec<String> {
        let ownership = observation.vip.ownership;
        let mut issues = Vec::new();

        for (side, health, has_vip) in [
            (Side::Primary, &observation.primary, ownership.primary_has_vip),
            (Side::Secondary, &observation.secondary, ownership.secondary_has_vip),
        ] {
            match (NodeRole::from_has_vip(has_vip), health.dhcp_enabled) {
                (NodeRole::Master, false) => issues.push(format!(
                    "DHCP misconfiguration: {} is MASTER but DHCP is DISABLED",
                    self.name(side)
                )),
                (NodeRole::Backup, true) => issues.push(format!(
                    "DHCP misconfiguration: {} is BACKUP but DHCP is ENABLED",
                    self.name(side)
                )),
                _ => {}
            }
        }

        let both_serving = observation.primary.dhcp_enabled && observation.secondary.dhcp_enabled;
        if both_serving {
            issues.push(format!(
                "DHCP conflict: both {} and {} have DHCP ENABLED",
                self.primary_name, self.secondary_name
            ));
        }

        issues
    }

    fn snapshot(&self, observation: &Observation, now: DateTime<Utc>) -> StatusSnapshot {
        let ownership = observation.vip.ownership;
        let status = |health: &NodeHealth, has_vip: bool| NodeStatus {
            role: NodeRole::from_has_vip(has_vip),
            online: health.reachable,
            service: health.service_up,
            dns: health.dns_works,
            dhcp: health.dhcp_enabled,
        };

        let dhcp_leases = match ownership.active_role() {
            ActiveRole::Primary => observation.primary.dhcp_lease_count,
            ActiveRole::Secondary => observation.secondary.dhcp_lease_count,
            ActiveRole::None => 0,
        };

        StatusSnapshot {
            timestamp: now,
            primary: status(&observation.primary, ownership.primary_has_vip),
            secondary: status(&observation.secondary, ownership.secondary_has_vip),
            primary_has_vip: ownership.primary_has_vip,
            secondary_has_vip: ownership.secondary_has_vip,
            dhcp_leases,
        }
    }
}
