//! HTTP/WS surface — sense & feed ingress, control, health, traces
//!
//! One axum router serves the overlay socket upgrade and the ingress
//! endpoints. Bad bodies answer 400, oversize bodies 413; neither touches
//! in-process state.

use crate::overlay::OverlayHub;
use crate::ws::handle_connection;
use axum::{
    extract::{DefaultBodyLimit, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use sinain_buffers::{FeedBuffer, SenseBuffer, SenseDraft};
use sinain_core::{
    CaptureControl, ConnectionStatus, EscalationMode, FeedChannel, FeedDraft, FeedPriority,
    FeedSource, OverlayMessage, SenseKind, SenseMeta,
};
use sinain_telemetry::{Profiler, Tracer};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub const MAX_SENSE_BODY: usize = 2 * 1024 * 1024;

/// Narrow view of the escalation pipeline the surface needs: mode control,
/// the direct-send path, and counters for /health.
pub trait EscalationControl: Send + Sync {
    fn mode(&self) -> EscalationMode;
    fn set_mode(&self, mode: EscalationMode);
    fn send_direct(&self, text: String);
    fn counters(&self) -> serde_json::Value;
}

/// Shared state for the HTTP surface and overlay connections.
pub struct HubState {
    pub feed: Arc<FeedBuffer>,
    pub sense: Arc<SenseBuffer>,
    pub tracer: Arc<Tracer>,
    pub profiler: Arc<Profiler>,
    pub control: Arc<CaptureControl>,
    pub connection: Arc<ConnectionStatus>,
    pub escalation: Arc<dyn EscalationControl>,
    pub overlay: Arc<OverlayHub>,
    /// Raised when ingress lands a new event; wired to the analyzer's
    /// debounce trigger.
    pub on_ingress: Arc<dyn Fn() + Send + Sync>,
    pub shutdown: CancellationToken,
    pub started_at: std::time::Instant,
}

impl HubState {
    pub fn status_message(&self) -> OverlayMessage {
        OverlayMessage::Status {
            audio: self.control.audio(),
            screen: self.control.screen(),
            connection: self.connection.get(),
        }
    }

    pub fn publish(&self, message: OverlayMessage) {
        self.overlay.publish(message);
    }
}

pub fn router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/sense", post(sense_post).get(sense_get))
        .route("/feed", post(feed_post).get(feed_get))
        .route("/profiling/sense", post(profiling_sense_post))
        .route("/agent/config", post(agent_config_post))
        .route("/health", get(health_handler))
        .route("/traces", get(traces_handler))
        .layer(DefaultBodyLimit::max(MAX_SENSE_BODY))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .with_state(state)
}

/// Bind and serve until the shutdown token fires.
pub async fn serve(state: Arc<HubState>, port: u16) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);
    let bind_addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    info!("hub listening on {} (overlay: ws://{}/ws)", bind_addr, bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<HubState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

// ── Sense ingress ───────────────────────────────────────────────────────

fn bad_request(error: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "ok": false, "error": error.into() })),
    )
}

async fn sense_post(
    State(state): State<Arc<HubState>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let Some(kind_str) = body.get("type").and_then(|v| v.as_str()) else {
        return bad_request("missing required field: type");
    };
    let Ok(kind) = serde_json::from_value::<SenseKind>(serde_json::json!(kind_str)) else {
        return bad_request(format!("unknown sense type: {}", kind_str));
    };
    let Some(ts) = body.get("ts").and_then(|v| v.as_f64()) else {
        return bad_request("missing required field: ts");
    };

    let meta = body
        .get("meta")
        .cloned()
        .map(|value| serde_json::from_value::<SenseMeta>(value).unwrap_or_default())
        .unwrap_or_default();

    let event = state.sense.push(SenseDraft {
        ts: ts as u64,
        kind,
        ocr: body
            .get("ocr")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        meta,
        roi: body.get("roi").cloned(),
        diff: body.get("diff").cloned(),
    });
    (state.on_ingress)();

    (
        StatusCode::OK,
        Json(serde_json::json!({ "ok": true, "id": event.id })),
    )
}

#[derive(Deserialize)]
struct SenseQuery {
    #[serde(default)]
    after: u64,
    #[serde(default)]
    meta_only: bool,
}

async fn sense_get(
    State(state): State<Arc<HubState>>,
    Query(query): Query<SenseQuery>,
) -> impl IntoResponse {
    Json(state.sense.query(query.after, query.meta_only))
}

// ── Feed ingress ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct FeedPost {
    text: String,
    #[serde(default)]
    source: Option<FeedSource>,
    #[serde(default)]
    channel: Option<FeedChannel>,
    #[serde(default)]
    priority: Option<FeedPriority>,
}

async fn feed_post(
    State(state): State<Arc<HubState>>,
    Json(body): Json<FeedPost>,
) -> impl IntoResponse {
    let draft = FeedDraft {
        source: body.source.unwrap_or(FeedSource::System),
        channel: body.channel.unwrap_or(FeedChannel::Stream),
        priority: body.priority.unwrap_or(FeedPriority::Normal),
        text: body.text,
    };
    match state.feed.push(draft) {
        Ok(item) => {
            state.publish(OverlayMessage::feed(&item));
            (state.on_ingress)();
            (
                StatusCode::OK,
                Json(serde_json::json!({ "ok": true, "id": item.id })),
            )
        }
        Err(err) => bad_request(err.to_string()),
    }
}

#[derive(Deserialize)]
struct FeedQuery {
    #[serde(default)]
    after: u64,
}

async fn feed_get(
    State(state): State<Arc<HubState>>,
    Query(query): Query<FeedQuery>,
) -> impl IntoResponse {
    Json(state.feed.query_overlay(query.after))
}

// ── Profiling, control, health, traces ──────────────────────────────────

async fn profiling_sense_post(
    State(state): State<Arc<HubState>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    state.profiler.set_sense_client_snapshot(body);
    Json(serde_json::json!({ "ok": true }))
}

#[derive(Deserialize)]
struct AgentConfigPost {
    mode: String,
}

async fn agent_config_post(
    State(state): State<Arc<HubState>>,
    Json(body): Json<AgentConfigPost>,
) -> impl IntoResponse {
    let Some(mode) = EscalationMode::parse(&body.mode) else {
        warn!(mode = %body.mode, "rejected unknown escalation mode");
        return bad_request(format!("unknown escalation mode: {}", body.mode));
    };
    state.escalation.set_mode(mode);
    state.publish(state.status_message());
    (
        StatusCode::OK,
        Json(serde_json::json!({ "ok": true, "mode": mode.as_str() })),
    )
}

async fn health_handler(State(state): State<Arc<HubState>>) -> impl IntoResponse {
    let stats = state.tracer.stats();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeS": state.started_at.elapsed().as_secs(),
        "escalation": {
            "mode": state.escalation.mode().as_str(),
            "counters": state.escalation.counters(),
        },
        "connection": state.connection.get(),
        "audio": state.control.audio(),
        "screen": state.control.screen(),
        "overlayClients": state.overlay.client_count(),
        "buffers": {
            "feedSize": state.feed.size(),
            "feedVersion": state.feed.version(),
            "senseSize": state.sense.size(),
            "senseVersion": state.sense.version(),
        },
        "traces": stats,
        "profiling": state.profiler.snapshot(),
    }))
}

#[derive(Deserialize)]
struct TracesQuery {
    #[serde(default)]
    after: u64,
    #[serde(default = "default_trace_limit")]
    limit: usize,
}

fn default_trace_limit() -> usize {
    50
}

async fn traces_handler(
    State(state): State<Arc<HubState>>,
    Query(query): Query<TracesQuery>,
) -> impl IntoResponse {
    Json(state.tracer.get_traces(query.after, query.limit))
}
