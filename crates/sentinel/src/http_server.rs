//! HTTP server for metrics, the reporting API and test notifications.

use crate::metrics::MetricsRegistry;
use crate::notify::{ChannelKind, Dispatcher, NotifySettings, SenderError, SettingsError, TestError};
use crate::rate_limit::RateLimiter;
use crate::store::{HistoryStore, StoreError};
use crate::types::{Event, NodeStatus, StatusSnapshot};
use axum::{
    Json, Router,
    extract::{ConnectInfo, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use prometheus_client::encoding::text::encode;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use vip::NodeRole;

const API_KEY_HEADER: &str = "x-api-key";
const MAX_EVENTS: u32 = 1000;

/// Reporting API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid API key")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Rate limit exceeded. Max {max_requests} requests per {window_secs} seconds.")]
    RateLimited { max_requests: usize, window_secs: u64 },

    #[error("Test failed: {0}")]
    TestFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Store(_) | ApiError::Settings(_) | ApiError::TestFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!(error = %self, "API request failed");
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<TestError> for ApiError {
    fn from(e: TestError) -> Self {
        match e {
            TestError::Settings(e) => ApiError::Settings(e),
            TestError::Send(SenderError::InvalidConfiguration(msg)) => ApiError::BadRequest(msg),
            other => ApiError::TestFailed(other.to_string()),
        }
    }
}

/// Static description of one monitored node
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub name: String,
    pub address: IpAddr,
}

/// Shared state of the API handlers
pub struct ApiState {
    pub store: Arc<dyn HistoryStore>,
    pub metrics: Arc<MetricsRegistry>,
    pub api_key: String,
    pub settings_path: PathBuf,
    pub dispatcher: Arc<Dispatcher>,
    pub rate_limiter: RateLimiter,
    pub primary: NodeInfo,
    pub secondary: NodeInfo,
    pub vip: IpAddr,
}

/// HTTP server for `/metrics` and `/api/*`
pub struct ApiServer {
    state: Arc<ApiState>,
    listen_addr: SocketAddr,
}

impl ApiServer {
    pub fn new(state: ApiState, listen_addr: SocketAddr) -> Self {
        Self {
            state: Arc::new(state),
            listen_addr,
        }
    }

    /// Run the HTTP server
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "API server listening");

        axum::serve(
            listener,
            router(self.state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }
}

/// Build the router; `/api/*` requires the `X-API-Key` header
pub fn router(state: Arc<ApiState>) -> Router {
    let api = Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/history", get(history_handler))
        .route("/api/events", get(events_handler))
        .route("/api/notifications/settings", get(settings_handler))
        .route("/api/notifications/test", post(test_notification_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn require_api_key(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if presented != Some(state.api_key.as_str()) {
        warn!(path = %req.uri().path(), "Rejected API request with invalid key");
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(req).await)
}

/// Handler for /metrics endpoint
async fn metrics_handler(State(state): State<Arc<ApiState>>) -> Response {
    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, &state.metrics.registry) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeView {
    pub ip: IpAddr,
    pub name: String,
    pub state: NodeRole,
    pub has_vip: bool,
    pub online: bool,
    pub service: bool,
    pub dns: bool,
    pub dhcp: bool,
}

impl NodeView {
    fn new(info: &NodeInfo, status: &NodeStatus, has_vip: bool) -> Self {
        Self {
            ip: info.address,
            name: info.name.clone(),
            state: status.role,
            has_vip,
            online: status.online,
            service: status.service,
            dns: status.dns,
            dhcp: status.dhcp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusView {
    pub timestamp: DateTime<Utc>,
    pub primary: NodeView,
    pub secondary: NodeView,
    pub vip: IpAddr,
    pub dhcp_leases: u64,
}

async fn status_handler(State(state): State<Arc<ApiState>>) -> Result<Json<StatusView>, ApiError> {
    let snapshot: StatusSnapshot = state
        .store
        .latest_snapshot()
        .await?
        .ok_or_else(|| ApiError::NotFound("No status data available".to_string()))?;

    Ok(Json(StatusView {
        timestamp: snapshot.timestamp,
        primary: NodeView::new(&state.primary, &snapshot.primary, snapshot.primary_has_vip),
        secondary: NodeView::new(&state.secondary, &snapshot.secondary, snapshot.secondary_has_vip),
        vip: state.vip,
        dhcp_leases: snapshot.dhcp_leases,
    }))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_hours")]
    hours: f64,
}

fn default_hours() -> f64 {
    24.0
}

/// One point of the role timeline; 1 means MASTER
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub time: DateTime<Utc>,
    pub primary: u8,
    pub secondary: u8,
}

fn is_master(status: &NodeStatus) -> u8 {
    u8::from(status.role == NodeRole::Master)
}

async fn history_handler(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryPoint>>, ApiError> {
    let points = state
        .store
        .history(query.hours)
        .await?
        .iter()
        .map(|snapshot| HistoryPoint {
            time: snapshot.timestamp,
            primary: is_master(&snapshot.primary),
            secondary: is_master(&snapshot.secondary),
        })
        .collect();
    Ok(Json(points))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    50
}

async fn events_handler(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let events = state
        .store
        .recent_events(query.limit.clamp(1, MAX_EVENTS))
        .await?;
    Ok(Json(events))
}

async fn settings_handler(State(state): State<Arc<ApiState>>) -> Result<Json<NotifySettings>, ApiError> {
    let settings = NotifySettings::load(&state.settings_path).await?;
    Ok(Json(settings.masked()))
}

#[derive(Debug, Deserialize)]
struct TestNotificationRequest {
    #[serde(default)]
    service: Option<String>,
}

/// Send a sample message through one channel, rate limited per client
async fn test_notification_handler(
    State(state): State<Arc<ApiState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<TestNotificationRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let client = peer.map(|ConnectInfo(addr)| addr.ip());
    if !state.rate_limiter.check(client, Instant::now()) {
        warn!(client = ?client, "Test notification rate limit exceeded");
        return Err(ApiError::RateLimited {
            max_requests: state.rate_limiter.max_requests(),
            window_secs: state.rate_limiter.window().as_secs(),
        });
    }

    let service = request
        .service
        .filter(|service| !service.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Service not specified".to_string()))?;
    let channel: ChannelKind = service.parse().map_err(|e| match e {
        SenderError::InvalidConfiguration(msg) => ApiError::BadRequest(msg),
        other => ApiError::BadRequest(other.to_string()),
    })?;

    state.dispatcher.send_test(channel).await?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "message": format!("Test notification sent via {channel}"),
    })))
}
