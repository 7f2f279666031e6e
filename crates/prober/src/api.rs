//! Client for a node's management API.

use crate::normalize::session_id;
use crate::types::ProbeConfig;
use common::{Error, Result};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Header carrying the session id on authenticated requests
pub const SESSION_HEADER: &str = "X-FTL-SID";

/// Management API client shared by every probe in the process.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    request_timeout: Duration,
    logout_timeout: Duration,
}

impl ApiClient {
    /// Create a client with a pooled connection manager
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.api_timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(Error::http)?;

        Ok(Self {
            client,
            request_timeout: config.api_timeout,
            logout_timeout: config.logout_timeout,
        })
    }

    /// Authenticate and return the session id
    pub async fn login(&self, base: &str, password: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{base}/api/auth"))
            .timeout(self.request_timeout)
            .json(&json!({ "password": password }))
            .send()
            .await
            .map_err(Error::http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::probe(format!("authentication returned {status}")));
        }

        let body: Value = response.json().await.map_err(Error::http)?;
        session_id(&body).ok_or_else(|| Error::probe("authentication response carried no session id"))
    }

    /// GET an authenticated endpoint and decode its JSON body
    pub async fn get_json(&self, base: &str, sid: &str, path: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{base}{path}"))
            .timeout(self.request_timeout)
            .header(SESSION_HEADER, sid)
            .send()
            .await
            .map_err(Error::http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::probe(format!("{path} returned {status}")));
        }

        response.json().await.map_err(Error::http)
    }

    /// Invalidate the session. Failures are only logged.
    pub async fn logout(&self, base: &str, sid: &str) {
        let result = self
            .client
            .delete(format!("{base}/api/auth"))
            .timeout(self.logout_timeout)
            .header(SESSION_HEADER, sid)
            .send()
            .await;

        if let Err(e) = result {
            debug!(base, error = %e, "Logout failed");
        }
    }
}
