//! Overlay WebSocket connection handling
//!
//! On accept: status snapshot, replay of the last feed messages in id
//! order, surviving spawn tasks in insertion order, then live forwarding.
//! Heartbeat every 10s: a client silent for two consecutive intervals is
//! closed with code 4000. Both a protocol ping and an app-level ping are
//! sent; some overlay runtimes never surface protocol pings.

use crate::server::HubState;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use sinain_core::{OverlayInbound, OverlayMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4000;
pub const CLOSE_GOING_AWAY: u16 = 1001;

pub async fn handle_connection(socket: WebSocket, state: Arc<HubState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let first_client = state.overlay.client_connected();
    let (replay, spawn_tasks, mut live_rx) = state.overlay.connect();

    // 1. one status snapshot
    let status = state.status_message();
    if send_json(&mut ws_tx, &status).await.is_err() {
        state.overlay.client_disconnected();
        return;
    }
    // a client arriving after a fully-disconnected stretch is news for
    // everyone (status consumers poll connection state off this)
    if first_client {
        state.publish(status);
    }

    // 2. replay buffer in id order
    for message in &replay {
        if send_json(&mut ws_tx, message).await.is_err() {
            state.overlay.client_disconnected();
            return;
        }
    }

    // 3. surviving spawn tasks in insertion order
    for task in spawn_tasks {
        if send_json(&mut ws_tx, &OverlayMessage::spawn_task(task))
            .await
            .is_err()
        {
            state.overlay.client_disconnected();
            return;
        }
    }

    let mut alive = true;
    let mut heartbeat = tokio::time::interval_at(
        (std::time::Instant::now() + HEARTBEAT_INTERVAL).into(),
        HEARTBEAT_INTERVAL,
    );

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = ws_tx
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: CLOSE_GOING_AWAY,
                        reason: "shutting down".into(),
                    })))
                    .await;
                break;
            }

            _ = heartbeat.tick() => {
                if !alive {
                    info!("overlay client failed heartbeat, closing");
                    let _ = ws_tx
                        .send(WsMessage::Close(Some(CloseFrame {
                            code: CLOSE_HEARTBEAT_TIMEOUT,
                            reason: "heartbeat timeout".into(),
                        })))
                        .await;
                    break;
                }
                alive = false;
                if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                let app_ping = OverlayMessage::Ping {
                    ts: sinain_core::now_ms(),
                };
                if send_json(&mut ws_tx, &app_ping).await.is_err() {
                    break;
                }
            }

            event = live_rx.recv() => {
                match event {
                    Ok(message) => {
                        if send_json(&mut ws_tx, &message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(dropped = n, "overlay client lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        alive = true;
                        handle_inbound(text.as_str(), &state);
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        alive = true;
                    }
                    Some(Ok(WsMessage::Ping(_))) => {
                        alive = true; // axum answers protocol pings itself
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!("overlay client closed");
                        break;
                    }
                    Some(Ok(WsMessage::Binary(_))) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "overlay socket error");
                        break;
                    }
                }
            }
        }
    }

    state.overlay.client_disconnected();
}

fn handle_inbound(text: &str, state: &Arc<HubState>) {
    let message: OverlayInbound = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(_) => {
            warn!("unknown overlay message: {}", &text[..text.len().min(120)]);
            return;
        }
    };

    match message {
        OverlayInbound::Message { text } => {
            info!("overlay user message: {}", &text[..text.len().min(80)]);
            state.escalation.send_direct(text);
        }
        OverlayInbound::Command { action } => match action.as_str() {
            "toggle_audio" => {
                let audio = state.control.toggle_audio();
                info!(?audio, "audio capture toggled");
                state.publish(state.status_message());
            }
            "toggle_screen" => {
                let screen = state.control.toggle_screen();
                info!(?screen, "screen capture toggled");
                state.publish(state.status_message());
            }
            "switch_device" => {
                let device = state.control.switch_device();
                info!(device, "audio device switched");
                state.publish(state.status_message());
            }
            other => {
                info!(command = other, "unhandled overlay command");
            }
        },
        OverlayInbound::Pong { .. } => {}
        OverlayInbound::Profiling { rss_mb, uptime_s, ts } => {
            state.profiler.set_overlay_snapshot(serde_json::json!({
                "rssMb": rss_mb,
                "uptimeS": uptime_s,
                "ts": ts,
            }));
        }
    }
}

async fn send_json(
    ws_tx: &mut futures::stream::SplitSink<WebSocket, WsMessage>,
    message: &OverlayMessage,
) -> Result<(), ()> {
    let json = serde_json::to_string(message).map_err(|_| ())?;
    ws_tx.send(WsMessage::Text(json.into())).await.map_err(|_| ())
}
