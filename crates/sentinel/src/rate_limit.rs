//! Per-client sliding window limiter for the notification test endpoint.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Clients tracked at once; the least recently seen one is evicted first
const MAX_TRACKED_CLIENTS: usize = 256;

/// Allows at most `max_requests` per `window` for each client
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: Mutex<HashMap<Option<IpAddr>, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a request from `client` at `now`; false when over the limit.
    ///
    /// Requests with an unknown peer address share one bucket.
    pub fn check(&self, client: Option<IpAddr>, now: Instant) -> bool {
        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if !clients.contains_key(&client) && clients.len() >= MAX_TRACKED_CLIENTS {
            let oldest = clients
                .iter()
                .min_by_key(|(_, hits)| hits.back().copied())
                .map(|(key, _)| *key);
            if let Some(key) = oldest {
                clients.remove(&key);
            }
        }

        let hits = clients.entry(client).or_default();
        while hits
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= self.window)
        {
            hits.pop_front();
        }

        if hits.len() >= self.max_requests {
            return false;
        }
        hits.push_back(now);
        true
    }
}

impl Default for RateLimiter {
    /// Three requests per minute
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}
