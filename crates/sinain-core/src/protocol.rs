//! Wire protocols — overlay fan-out messages and assistant gateway RPC
//!
//! Overlay socket (JSON per message, tagged by `type`):
//!
//! Server → Client:
//!   { "type": "feed",   "text": "...", "priority": "normal", "ts": 0, "channel": "stream" }
//!   { "type": "status", "audio": "active", "screen": "active", "connection": "connected" }
//!   { "type": "ping",   "ts": 0 }
//!   { "type": "spawn_task", "taskId": "...", "label": "...", "status": "spawned", ... }
//!   { "type": "profiling", "snapshot": { ... } }
//!
//! Client → Server:
//!   { "type": "message", "text": "..." }
//!   { "type": "command", "action": "toggle_audio" }
//!   { "type": "pong",    "ts": 0 }
//!   { "type": "profiling", "rssMb": 0, "uptimeS": 0, "ts": 0 }
//!
//! Assistant gateway (JSON-RPC style with correlation ids):
//!   → { "id": "req-1", "method": "connect", "params": { "auth": { "token": "..." }, ... } }
//!   ← { "id": "req-1", "result": { "ok": true } }
//!   ← { "event": "connect.challenge", "data": { "nonce": "..." } }

use crate::types::{
    AudioState, ConnectionState, FeedChannel, FeedItem, FeedPriority, ScreenState, SpawnTask,
};
use serde::{Deserialize, Serialize};

// ── Overlay: server → client ────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OverlayMessage {
    #[serde(rename = "feed")]
    Feed {
        text: String,
        priority: FeedPriority,
        ts: u64,
        channel: FeedChannel,
    },

    #[serde(rename = "status")]
    Status {
        audio: AudioState,
        screen: ScreenState,
        connection: ConnectionState,
    },

    #[serde(rename = "ping")]
    Ping { ts: u64 },

    #[serde(rename = "spawn_task")]
    SpawnTask {
        #[serde(flatten)]
        task: SpawnTask,
    },

    #[serde(rename = "profiling")]
    Profiling { snapshot: serde_json::Value },
}

impl OverlayMessage {
    pub fn feed(item: &FeedItem) -> Self {
        Self::Feed {
            text: item.text.clone(),
            priority: item.priority,
            ts: item.ts,
            channel: item.channel,
        }
    }

    pub fn spawn_task(task: SpawnTask) -> Self {
        Self::SpawnTask { task }
    }

    /// True for `feed` messages, which the replay buffer retains.
    pub fn is_feed(&self) -> bool {
        matches!(self, Self::Feed { .. })
    }
}

// ── Overlay: client → server ────────────────────────────────────────────

/// Inbound overlay messages. Unknown `type` tags fail to parse and are
/// logged then ignored by the server.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum OverlayInbound {
    #[serde(rename = "message")]
    Message { text: String },

    #[serde(rename = "command")]
    Command { action: String },

    #[serde(rename = "pong")]
    Pong {
        #[serde(default)]
        ts: u64,
    },

    #[serde(rename = "profiling")]
    Profiling {
        #[serde(rename = "rssMb")]
        rss_mb: f64,
        #[serde(rename = "uptimeS")]
        uptime_s: f64,
        ts: u64,
    },
}

// ── Assistant gateway RPC ───────────────────────────────────────────────

/// RPC request with a correlation id.
#[derive(Clone, Debug, Serialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    pub params: serde_json::Value,
}

/// RPC response correlated by id.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RpcResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// Server-pushed event (no correlation id).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GatewayEvent {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// One inbound frame from the assistant gateway. Serde tries the response
/// shape first, then the event shape.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum GatewayFrame {
    Response(RpcResponse),
    Event(GatewayEvent),
}
