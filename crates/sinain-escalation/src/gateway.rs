//! Assistant gateway client — persistent challenge-response RPC socket
//!
//! Protocol: connect → gateway emits `connect.challenge` → client sends a
//! `connect` request with its token and protocol range → `ok` means
//! authenticated. Requests carry correlation ids; a 60s timeout yields a
//! typed timeout (the assistant may still be processing), which callers
//! must not retry. On close the client waits 5s and reconnects, repeating
//! the handshake.

use futures::{SinkExt, StreamExt};
use sinain_core::{
    ConnectionState, ConnectionStatus, Error, GatewayEvent, GatewayFrame, Result, RpcRequest,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMsg};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
const PROTOCOL_VERSION: u32 = 3;

#[derive(Clone, Debug)]
pub struct GatewayClientConfig {
    pub ws_url: String,
    pub token: Option<String>,
    pub session_key: String,
}

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Result<serde_json::Value>>>>>;
type EventCallback = Arc<dyn Fn(&GatewayEvent) + Send + Sync>;

pub struct AssistantGateway {
    config: GatewayClientConfig,
    status: Arc<ConnectionStatus>,
    out_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending: Pending,
    next_id: AtomicU64,
    cancel: Mutex<Option<CancellationToken>>,
    on_event: Mutex<Option<EventCallback>>,
}

impl AssistantGateway {
    pub fn new(config: GatewayClientConfig, status: Arc<ConnectionStatus>) -> Self {
        Self {
            config,
            status,
            out_tx: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            cancel: Mutex::new(None),
            on_event: Mutex::new(None),
        }
    }

    /// Register a callback for unsolicited gateway events (inbound feed
    /// items). The client never holds a pointer back into its owner.
    pub fn set_event_callback(&self, callback: EventCallback) {
        *self.on_event.lock().unwrap() = Some(callback);
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_ready()
    }

    /// Start the persistent connection task. Idempotent: a running task is
    /// left alone.
    pub fn start(self: Arc<Self>) {
        let mut guard = self.cancel.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        *guard = Some(cancel.clone());
        drop(guard);

        tokio::spawn(async move {
            self.connection_loop(cancel).await;
        });
    }

    /// Tear the socket down and stop reconnecting.
    pub fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().unwrap().take() {
            cancel.cancel();
        }
        *self.out_tx.lock().unwrap() = None;
        self.status.set(ConnectionState::Disconnected);
        self.fail_pending("client stopped");
    }

    async fn connection_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            self.status.set(ConnectionState::Connecting);
            match self.run_connection(&cancel).await {
                Ok(()) => info!("gateway connection closed"),
                Err(err) => warn!(error = %err, "gateway connection failed"),
            }
            *self.out_tx.lock().unwrap() = None;
            self.status.set(ConnectionState::Disconnected);
            self.fail_pending("connection closed");

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
    }

    async fn run_connection(&self, cancel: &CancellationToken) -> Result<()> {
        let (stream, _) = connect_async(&self.config.ws_url)
            .await
            .map_err(|e| Error::GatewayClosed(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = stream.split();
        info!(url = %self.config.ws_url, "gateway socket open, awaiting challenge");

        // The gateway speaks first: wait for connect.challenge.
        let challenge = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            while let Some(frame) = ws_rx.next().await {
                let frame = frame.map_err(|e| Error::GatewayClosed(e.to_string()))?;
                if let WsMsg::Text(text) = frame {
                    if let Ok(GatewayFrame::Event(event)) = serde_json::from_str(text.as_str()) {
                        if event.event == "connect.challenge" {
                            return Ok(event);
                        }
                    }
                }
            }
            Err(Error::GatewayClosed("closed before challenge".into()))
        })
        .await
        .map_err(|_| Error::GatewayClosed("challenge timed out".into()))??;
        debug!(nonce = %challenge.data["nonce"], "challenge received");

        // Answer with the connect request.
        let connect_id = self.allocate_id();
        let connect = RpcRequest {
            id: connect_id.clone(),
            method: "connect".to_string(),
            params: serde_json::json!({
                "auth": { "token": self.config.token },
                "minProtocol": PROTOCOL_VERSION,
                "maxProtocol": PROTOCOL_VERSION,
                "client": { "mode": "backend" },
            }),
        };
        ws_tx
            .send(WsMsg::Text(serde_json::to_string(&connect)?.into()))
            .await
            .map_err(|e| Error::GatewayClosed(e.to_string()))?;

        // Wait for the matching ok.
        tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            while let Some(frame) = ws_rx.next().await {
                let frame = frame.map_err(|e| Error::GatewayClosed(e.to_string()))?;
                if let WsMsg::Text(text) = frame {
                    if let Ok(GatewayFrame::Response(resp)) = serde_json::from_str(text.as_str()) {
                        if resp.id == connect_id {
                            return match resp.error {
                                None => Ok(()),
                                Some(err) => Err(Error::rpc(err.code, err.message)),
                            };
                        }
                    }
                }
            }
            Err(Error::GatewayClosed("closed during auth".into()))
        })
        .await
        .map_err(|_| Error::GatewayClosed("auth timed out".into()))??;

        self.status.set(ConnectionState::Connected);
        self.status.set_authenticated(true);
        info!("gateway authenticated");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        *self.out_tx.lock().unwrap() = Some(out_tx);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = ws_tx.send(WsMsg::Close(None)).await;
                    return Ok(());
                }

                outbound = out_rx.recv() => {
                    let Some(text) = outbound else { return Ok(()) };
                    ws_tx
                        .send(WsMsg::Text(text.into()))
                        .await
                        .map_err(|e| Error::GatewayClosed(e.to_string()))?;
                }

                inbound = ws_rx.next() => {
                    match inbound {
                        Some(Ok(WsMsg::Text(text))) => self.handle_frame(text.as_str()),
                        Some(Ok(WsMsg::Close(_))) | None => {
                            return Err(Error::GatewayClosed("peer closed".into()));
                        }
                        Some(Ok(_)) => {} // binary, ping/pong handled by the stack
                        Some(Err(err)) => {
                            return Err(Error::GatewayClosed(err.to_string()));
                        }
                    }
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<GatewayFrame>(text) {
            Ok(GatewayFrame::Response(resp)) => {
                let waiter = self.pending.lock().unwrap().remove(&resp.id);
                if let Some(tx) = waiter {
                    let outcome = match resp.error {
                        Some(err) => Err(Error::rpc(err.code, err.message)),
                        None => Ok(resp.result.unwrap_or(serde_json::Value::Null)),
                    };
                    let _ = tx.send(outcome);
                } else {
                    debug!(id = %resp.id, "response for unknown request");
                }
            }
            Ok(GatewayFrame::Event(event)) => {
                if let Some(callback) = self.on_event.lock().unwrap().as_ref() {
                    callback(&event);
                } else {
                    debug!(event = %event.event, "gateway event (no subscriber)");
                }
            }
            Err(_) => warn!("unparseable gateway frame: {}", &text[..text.len().min(120)]),
        }
    }

    fn fail_pending(&self, reason: &str) {
        let drained: Vec<_> = self.pending.lock().unwrap().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(Error::GatewayClosed(reason.to_string())));
        }
    }

    fn allocate_id(&self) -> String {
        format!("req-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Issue one RPC call. Timeout yields `Error::GatewayTimeout`; callers
    /// must not retry a timeout (only a network failure).
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let id = self.allocate_id();
        let request = RpcRequest {
            id: id.clone(),
            method: method.to_string(),
            params,
        };
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id.clone(), tx);

        let sent = {
            let out = self.out_tx.lock().unwrap();
            match out.as_ref() {
                Some(out_tx) => out_tx.send(serde_json::to_string(&request)?).is_ok(),
                None => false,
            }
        };
        if !sent {
            self.pending.lock().unwrap().remove(&id);
            return Err(Error::GatewayClosed("not connected".into()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::GatewayClosed("request dropped".into())),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(Error::GatewayTimeout(timeout.as_millis() as u64))
            }
        }
    }

    /// `agent.wait` — deliver a message and wait for the assistant's reply
    /// payloads.
    pub async fn agent_wait(
        &self,
        message: &str,
        idem_key: &str,
    ) -> Result<serde_json::Value> {
        self.call(
            "agent.wait",
            serde_json::json!({
                "message": message,
                "idemKey": idem_key,
                "sessionKey": self.config.session_key,
                "timeoutMs": DEFAULT_CALL_TIMEOUT.as_millis() as u64,
            }),
            DEFAULT_CALL_TIMEOUT,
        )
        .await
    }
}
