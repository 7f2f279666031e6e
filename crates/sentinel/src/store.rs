//! Append-only history of snapshots and events.

use crate::types::{Event, EventKind, NodeStatus, StatusSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::RwLock;
use vip::NodeRole;

/// History store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Decode(String),
}

impl From<StoreError> for common::Error {
    fn from(e: StoreError) -> Self {
        common::Error::store(e)
    }
}

/// Persistence for everything the monitor observes
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append_snapshot(&self, snapshot: &StatusSnapshot) -> Result<(), StoreError>;

    async fn append_event(&self, event: &Event) -> Result<(), StoreError>;

    async fn latest_snapshot(&self) -> Result<Option<StatusSnapshot>, StoreError>;

    /// Snapshots newer than `since_hours` ago, oldest first
    async fn history(&self, since_hours: f64) -> Result<Vec<StatusSnapshot>, StoreError>;

    /// Most recent events, newest first
    async fn recent_events(&self, limit: u32) -> Result<Vec<Event>, StoreError>;

    /// Delete rows older than `older_than`; returns the number removed
    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Start of a `since_hours` window, never earlier than the Unix epoch
fn cutoff(since_hours: f64) -> DateTime<Utc> {
    let millis = (since_hours.max(0.0) * 3_600_000.0) as i64;
    ChronoDuration::try_milliseconds(millis)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .map_or(DateTime::UNIX_EPOCH, |start| start.max(DateTime::UNIX_EPOCH))
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS status_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        primary_state TEXT NOT NULL,
        secondary_state TEXT NOT NULL,
        primary_has_vip BOOLEAN NOT NULL,
        secondary_has_vip BOOLEAN NOT NULL,
        primary_online BOOLEAN NOT NULL,
        secondary_online BOOLEAN NOT NULL,
        primary_service BOOLEAN NOT NULL,
        secondary_service BOOLEAN NOT NULL,
        primary_dns BOOLEAN NOT NULL,
        secondary_dns BOOLEAN NOT NULL,
        primary_dhcp BOOLEAN NOT NULL,
        secondary_dhcp BOOLEAN NOT NULL,
        dhcp_leases INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        message TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_status_timestamp ON status_history(timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type, timestamp DESC)",
];

#[derive(FromRow)]
struct SnapshotRow {
    timestamp: DateTime<Utc>,
    primary_state: String,
    secondary_state: String,
    primary_has_vip: bool,
    secondary_has_vip: bool,
    primary_online: bool,
    secondary_online: bool,
    primary_service: bool,
    secondary_service: bool,
    primary_dns: bool,
    secondary_dns: bool,
    primary_dhcp: bool,
    secondary_dhcp: bool,
    dhcp_leases: i64,
}

impl TryFrom<SnapshotRow> for StatusSnapshot {
    type Error = StoreError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let role = |s: &str| NodeRole::from_str(s).map_err(StoreError::Decode);

        Ok(StatusSnapshot {
            timestamp: row.timestamp,
            primary: NodeStatus {
                role: role(&row.primary_state)?,
                online: row.primary_online,
                service: row.primary_service,
                dns: row.primary_dns,
                dhcp: row.primary_dhcp,
            },
            secondary: NodeStatus {
                role: role(&row.secondary_state)?,
                online: row.secondary_online,
                service: row.secondary_service,
                dns: row.secondary_dns,
                dhcp: row.secondary_dhcp,
            },
            primary_has_vip: row.primary_has_vip,
            secondary_has_vip: row.secondary_has_vip,
            dhcp_leases: u64::try_from(row.dhcp_leases).unwrap_or(0),
        })
    }
}

#[derive(FromRow)]
struct EventRow {
    timestamp: DateTime<Utc>,
    event_type: String,
    message: String,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let kind = EventKind::from_str(&row.event_type).map_err(StoreError::Decode)?;
        Ok(Event::new(row.timestamp, kind, row.message))
    }
}

/// SQLite-backed history store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        tracing::info!(database = url, "History store ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn append_snapshot(&self, snapshot: &StatusSnapshot) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO status_history (timestamp, primary_state, secondary_state, \
             primary_has_vip, secondary_has_vip, primary_online, secondary_online, \
             primary_service, secondary_service, primary_dns, secondary_dns, \
             primary_dhcp, secondary_dhcp, dhcp_leases) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(snapshot.timestamp)
        .bind(snapshot.primary.role.as_str())
        .bind(snapshot.secondary.role.as_str())
        .bind(snapshot.primary_has_vip)
        .bind(snapshot.secondary_has_vip)
        .bind(snapshot.primary.online)
        .bind(snapshot.secondary.online)
        .bind(snapshot.primary.service)
        .bind(snapshot.secondary.service)
        .bind(snapshot.primary.dns)
        .bind(snapshot.secondary.dns)
        .bind(snapshot.primary.dhcp)
        .bind(snapshot.secondary.dhcp)
        .bind(i64::try_from(snapshot.dhcp_leases).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_event(&self, event: &Event) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO events (timestamp, event_type, message) VALUES (?, ?, ?)")
            .bind(event.timestamp)
            .bind(event.kind.as_str())
            .bind(&event.message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn latest_snapshot(&self) -> Result<Option<StatusSnapshot>, StoreError> {
        sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM status_history ORDER BY timestamp DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .map(StatusSnapshot::try_from)
        .transpose()
    }

    async fn history(&self, since_hours: f64) -> Result<Vec<StatusSnapshot>, StoreError> {
        sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM status_history WHERE timestamp > ? ORDER BY timestamp ASC, id ASC",
        )
        .bind(cutoff(since_hours))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(StatusSnapshot::try_from)
        .collect()
    }

    async fn recent_events(&self, limit: u32) -> Result<Vec<Event>, StoreError> {
        sqlx::query_as::<_, EventRow>(
            "SELECT timestamp, event_type, message FROM events \
             ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Event::try_from)
        .collect()
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let snapshots = sqlx::query("DELETE FROM status_history WHERE timestamp < ?")
            .bind(older_than)
            .execute(&self.pool)
            .await?
            .rows_affected();
        let events = sqlx::query("DELETE FROM events WHERE timestamp < ?")
            .bind(older_than)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(snapshots + events)
    }
}

/// In-memory history store
#[derive(Default)]
pub struct MemoryStore {
    snapshots: RwLock<Vec<StatusSnapshot>>,
    events: RwLock<Vec<Event>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in insertion order
    pub async fn events(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }

    /// All snapshots in insertion order
    pub async fn snapshots(&self) -> Vec<StatusSnapshot> {
        self.snapshots.read().await.clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append_snapshot(&self, snapshot: &StatusSnapshot) -> Result<(), StoreError> {
        self.snapshots.write().await.push(snapshot.clone());
        Ok(())
    }

    async fn append_event(&self, event: &Event) -> Result<(), StoreError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn latest_snapshot(&self) -> Result<Option<StatusSnapshot>, StoreError> {
        Ok(self.snapshots.read().await.last().cloned())
    }

    async fn history(&self, since_hours: f64) -> Result<Vec<StatusSnapshot>, StoreError> {
        let since = cutoff(since_hours);
        Ok(self
            .snapshots
            .read()
            .await
            .iter()
            .filter(|s| s.timestamp > since)
            .cloned()
            .collect())
    }

    async fn recent_events(&self, limit: u32) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut snapshots = self.snapshots.write().await;
        let mut events = self.events.write().await;
        let before = snapshots.len() + events.len();

        snapshots.retain(|s| s.timestamp >= older_than);
        events.retain(|e| e.timestamp >= older_than);

        Ok((before - snapshots.len() - events.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(timestamp: DateTime<Utc>, primary_master: bool) -> StatusSnapshot {
        let status = |master: bool| NodeStatus {
            role: NodeRole::from_has_vip(master),
            online: true,
            service: true,
            dns: true,
            dhcp: master,
        };

        StatusSnapshot {
            timestamp,
            primary: status(primary_master),
            secondary: status(!primary_master),
            primary_has_vip: primary_master,
            secondary_has_vip: !primary_master,
            dhcp_leases: 7,
        }
    }

    #[tokio::test]
    async fn test_memory_store_orders_events_newest_first() {
        let store = MemoryStore::new();
        let now = Utc::now();

        for i in 0..5 {
            store
                .append_event(&Event::info(now, format!("event {i}")))
                .await
                .unwrap();
        }

        let events = store.recent_events(3).await.unwrap();
        let messages: Vec<_> = events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["event 4", "event 3", "event 2"]);
    }

    #[tokio::test]
    async fn test_memory_store_history_and_prune() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store.append_snapshot(&snapshot(now - ChronoDuration::hours(48), true)).await.unwrap();
        store.append_snapshot(&snapshot(now - ChronoDuration::hours(2), false)).await.unwrap();
        store.append_snapshot(&snapshot(now, true)).await.unwrap();
        store.append_event(&Event::info(now - ChronoDuration::hours(48), "old")).await.unwrap();

        assert_eq!(store.history(24.0).await.unwrap().len(), 2);
        assert_eq!(store.latest_snapshot().await.unwrap().unwrap().timestamp, now);

        let removed = store.prune(now - ChronoDuration::hours(24)).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.history(72.0).await.unwrap().len(), 2);
        assert!(store.recent_events(10).await.unwrap().is_empty());
    }

    #[test]
    fn test_cutoff_clamps_to_epoch() {
        assert_eq!(cutoff(1e300), DateTime::UNIX_EPOCH);
        assert_eq!(cutoff(f64::INFINITY), DateTime::UNIX_EPOCH);
        assert!(cutoff(f64::NAN) > Utc::now() - ChronoDuration::seconds(5));
        assert!(cutoff(-3.0) > Utc::now() - ChronoDuration::seconds(5));
    }

    #[tokio::test]
    async fn test_memory_store_huge_window_returns_everything() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.append_snapshot(&snapshot(now - ChronoDuration::days(400), true)).await.unwrap();
        store.append_snapshot(&snapshot(now, true)).await.unwrap();

        assert_eq!(store.history(1e300).await.unwrap().len(), 2);
        assert_eq!(store.history(f64::INFINITY).await.unwrap().len(), 2);
    }

    #[test]
    fn test_snapshot_row_rejects_unknown_role() {
        let row = SnapshotRow {
            timestamp: Utc::now(),
            primary_state: "FAULT".to_string(),
            secondary_state: "BACKUP".to_string(),
            primary_has_vip: false,
            secondary_has_vip: false,
            primary_online: false,
            secondary_online: true,
            primary_service: false,
            secondary_service: true,
            primary_dns: false,
            secondary_dns: true,
            primary_dhcp: false,
            secondary_dhcp: false,
            dhcp_leases: 0,
        };

        assert!(matches!(StatusSnapshot::try_from(row), Err(StoreError::Decode(_))));
    }
}
