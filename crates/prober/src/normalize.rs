//! Normalization of management API responses.
//!
//! The API has shipped several response shapes over time. Everything here is
//! pure so the shape handling can be tested without a node.

use crate::types::SummaryCounters;
use serde_json::Value;
use tracing::debug;

/// Lease collection extracted from a `/api/dhcp/leases` response.
#[derive(Debug, Clone, PartialEq)]
pub enum LeaseList {
    /// A lease collection was present
    Found(Vec<Value>),
    /// No lease collection anywhere in the response
    Empty,
    /// Something sat where the collection should be, but it was not one
    Malformed,
}

impl LeaseList {
    /// Number of leases, 0 unless a collection was found.
    pub fn count(&self) -> u64 {
        match self {
            LeaseList::Found(leases) => leases.len() as u64,
            LeaseList::Empty | LeaseList::Malformed => 0,
        }
    }
}

enum Candidate {
    Absent,
    Collection(Vec<Value>),
    Scalar,
}

fn candidate(value: Option<&Value>, objects_allowed: bool) -> Candidate {
    match value {
        None | Some(Value::Null) => Candidate::Absent,
        Some(Value::Array(items)) => Candidate::Collection(items.clone()),
        Some(Value::Object(map)) if objects_allowed => {
            Candidate::Collection(map.values().cloned().collect())
        }
        Some(_) => Candidate::Scalar,
    }
}

/// Locate the lease collection in any of the known response shapes.
///
/// Candidates are tried in order: the body itself when it is an array,
/// `leases`, `dhcp.leases`, then `data` (arrays only). An empty collection
/// does not stop the search, so a populated later candidate wins.
pub fn normalize_leases(body: &Value) -> LeaseList {
    let map = match body {
        Value::Array(items) => return LeaseList::Found(items.clone()),
        Value::Object(map) => map,
        other => {
            debug!(kind = json_kind(other), "Lease response is not an object or array");
            return LeaseList::Malformed;
        }
    };

    let candidates = [
        candidate(map.get("leases"), true),
        candidate(map.get("dhcp").and_then(|dhcp| dhcp.get("leases")), true),
        candidate(map.get("data").filter(|data| data.is_array()), false),
    ];

    let mut saw_empty = false;
    let mut saw_scalar = false;
    for found in candidates {
        match found {
            Candidate::Collection(items) if !items.is_empty() => return LeaseList::Found(items),
            Candidate::Collection(_) => saw_empty = true,
            Candidate::Scalar => saw_scalar = true,
            Candidate::Absent => {}
        }
    }

    if saw_empty {
        LeaseList::Found(Vec::new())
    } else if saw_scalar {
        debug!("Lease collection present but not a list or map");
        LeaseList::Malformed
    } else {
        LeaseList::Empty
    }
}

fn number(value: Option<&Value>) -> Option<u64> {
    let value = value?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

/// Extract query/block/client counters from a `/api/stats/summary` body.
///
/// Accepts the nested shape (`queries.total`, `queries.blocked`,
/// `clients.total` or `clients.active`) and the flat legacy keys. Missing
/// values are zero.
pub fn summary_counters(body: &Value) -> SummaryCounters {
    let queries = body.get("queries");
    let clients = body.get("clients");

    SummaryCounters {
        queries: number(queries.and_then(|q| q.get("total")))
            .or_else(|| number(body.get("dns_queries_today")))
            .unwrap_or(0),
        blocked: number(queries.and_then(|q| q.get("blocked")))
            .or_else(|| number(body.get("ads_blocked_today")))
            .unwrap_or(0),
        clients: number(clients.and_then(|c| c.get("total")))
            .or_else(|| number(clients.and_then(|c| c.get("active"))))
            .or_else(|| number(body.get("unique_clients")))
            .unwrap_or(0),
    }
}

/// Read `config.dhcp.active` from a `/api/config/dhcp` body; anything else is `false`.
pub fn dhcp_active(body: &Value) -> bool {
    body.get("config")
        .and_then(|config| config.get("dhcp"))
        .and_then(|dhcp| dhcp.get("active"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Read `session.sid` from a `/api/auth` body.
pub fn session_id(body: &Value) -> Option<String> {
    body.get("session")
        .and_then(|session| session.get("sid"))
        .and_then(Value::as_str)
        .filter(|sid| !sid.is_empty())
        .map(str::to_string)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
