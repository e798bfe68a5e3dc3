//! Escalation orchestrator — cooldown, dedup, delivery, counters
//!
//! Owns the escalation history and the gateway client handle. Cooldown
//! starts at decision time, not delivery time: the history is updated
//! under the lock before any I/O. Delivery runs in its own task so a slow
//! assistant never blocks the tick engine.

use crate::gateway::{AssistantGateway, GatewayClientConfig};
use crate::message::build_escalation_message;
use crate::score::{calculate_escalation_score, decide_escalation, GateInput};
use sinain_agent::{EscalationOutcome, EscalationSink};
use sinain_buffers::{assemble_window, FeedBuffer, SenseBuffer};
use sinain_core::{
    AgentEntry, ConnectionStatus, ContextWindow, Error, EscalationMode, EscalationModeState,
    FeedChannel, FeedDraft, FeedPriority, FeedSource, OverlayMessage,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use tracing::{debug, info, warn};

const ROBOT_GLYPH: &str = "🤖";
const RESPONSE_CHAR_CAP: usize = 2_000;

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub cooldown_ms: u64,
    /// Age bound used when re-assembling the mode-sized message context.
    pub max_age_ms: u64,
    pub gateway: Option<GatewayClientConfig>,
    pub hook_url: Option<String>,
    pub hook_token: Option<String>,
    pub session_key: String,
}

#[derive(Default)]
struct History {
    last_escalation_ts: u64,
    last_escalated_digest: Option<String>,
}

#[derive(Default)]
pub struct Counters {
    pub total_escalations: AtomicU64,
    pub total_responses: AtomicU64,
    pub total_errors: AtomicU64,
    pub total_no_reply: AtomicU64,
    pub last_escalation_at: AtomicU64,
    pub last_response_at: AtomicU64,
    pub last_error_at: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "totalEscalations": self.total_escalations.load(Ordering::Relaxed),
            "totalResponses": self.total_responses.load(Ordering::Relaxed),
            "totalErrors": self.total_errors.load(Ordering::Relaxed),
            "totalNoReply": self.total_no_reply.load(Ordering::Relaxed),
            "lastEscalationAt": self.last_escalation_at.load(Ordering::Relaxed),
            "lastResponseAt": self.last_response_at.load(Ordering::Relaxed),
            "lastErrorAt": self.last_error_at.load(Ordering::Relaxed),
        })
    }
}

pub struct Orchestrator {
    mode: Arc<EscalationModeState>,
    cooldown_ms: u64,
    max_age_ms: u64,
    gateway_config: Option<GatewayClientConfig>,
    gateway: Mutex<Option<Arc<AssistantGateway>>>,
    connection: Arc<ConnectionStatus>,
    http: reqwest::Client,
    hook_url: Option<String>,
    hook_token: Option<String>,
    session_key: String,
    feed: Arc<FeedBuffer>,
    sense: Arc<SenseBuffer>,
    outbound: mpsc::UnboundedSender<OverlayMessage>,
    history: Mutex<History>,
    counters: Arc<Counters>,
    event_callback: Mutex<Option<GatewayEventCallback>>,
}

/// Callback invoked for unsolicited gateway events (inbound feed items,
/// spawn-task lifecycle updates).
pub type GatewayEventCallback = Arc<dyn Fn(&sinain_core::GatewayEvent) + Send + Sync>;

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        mode: Arc<EscalationModeState>,
        connection: Arc<ConnectionStatus>,
        feed: Arc<FeedBuffer>,
        sense: Arc<SenseBuffer>,
        outbound: mpsc::UnboundedSender<OverlayMessage>,
    ) -> Arc<Self> {
        let orchestrator = Arc::new(Self {
            mode,
            cooldown_ms: config.cooldown_ms,
            max_age_ms: config.max_age_ms,
            gateway_config: config.gateway,
            gateway: Mutex::new(None),
            connection,
            http: reqwest::Client::new(),
            hook_url: config.hook_url,
            hook_token: config.hook_token,
            session_key: config.session_key,
            feed,
            sense,
            outbound,
            history: Mutex::new(History::default()),
            counters: Arc::new(Counters::default()),
            event_callback: Mutex::new(None),
        });
        if orchestrator.mode() != EscalationMode::Off {
            orchestrator.bring_gateway_up();
        }
        orchestrator
    }

    pub fn mode(&self) -> EscalationMode {
        self.mode.get()
    }

    /// Runtime mode switch. The off↔non-off edge brings the RPC socket up
    /// or tears it down.
    pub fn set_mode(&self, mode: EscalationMode) {
        let previous = self.mode.set(mode);
        info!(from = previous.as_str(), to = mode.as_str(), "escalation mode switched");
        match (previous, mode) {
            (EscalationMode::Off, m) if m != EscalationMode::Off => self.bring_gateway_up(),
            (p, EscalationMode::Off) if p != EscalationMode::Off => self.take_gateway_down(),
            _ => {}
        }
    }

    pub fn counters(&self) -> serde_json::Value {
        self.counters.snapshot()
    }

    pub fn gateway(&self) -> Option<Arc<AssistantGateway>> {
        self.gateway.lock().unwrap().clone()
    }

    /// Register the callback applied to every gateway instance, including
    /// ones created by later mode switches.
    pub fn set_gateway_event_callback(&self, callback: GatewayEventCallback) {
        if let Some(gateway) = self.gateway() {
            gateway.set_event_callback(callback.clone());
        }
        *self.event_callback.lock().unwrap() = Some(callback);
    }

    fn bring_gateway_up(&self) {
        let Some(config) = &self.gateway_config else {
            debug!("no gateway configured, escalations will use the HTTP hook");
            return;
        };
        let mut guard = self.gateway.lock().unwrap();
        if guard.is_none() {
            let gateway = Arc::new(AssistantGateway::new(
                config.clone(),
                self.connection.clone(),
            ));
            if let Some(callback) = self.event_callback.lock().unwrap().clone() {
                gateway.set_event_callback(callback);
            }
            gateway.clone().start();
            *guard = Some(gateway);
        }
    }

    fn take_gateway_down(&self) {
        if let Some(gateway) = self.gateway.lock().unwrap().take() {
            gateway.stop();
        }
    }

    /// Direct-send path for overlay user messages: skips scoring, uses the
    /// identical transport rules.
    pub fn send_direct(&self, text: String) {
        let delivery = self.delivery(
            text,
            format!("msg-{}", sinain_core::now_ms()),
            self.mode(),
        );
        tokio::spawn(delivery.run());
    }

    fn delivery(&self, message: String, idem_key: String, mode: EscalationMode) -> Delivery {
        Delivery {
            gateway: self.gateway(),
            http: self.http.clone(),
            hook_url: self.hook_url.clone(),
            hook_token: self.hook_token.clone(),
            session_key: self.session_key.clone(),
            feed: self.feed.clone(),
            outbound: self.outbound.clone(),
            counters: self.counters.clone(),
            mode,
            message,
            idem_key,
            digest: None,
        }
    }
}

#[async_trait::async_trait]
impl EscalationSink for Orchestrator {
    async fn on_tick(&self, entry: &AgentEntry, window: &ContextWindow) -> EscalationOutcome {
        let mode = self.mode();
        let score = calculate_escalation_score(&entry.digest, window);
        let now = sinain_core::now_ms();

        let escalate = {
            // Decision and history update are one atomic step; cooldown
            // starts here, before any delivery I/O.
            let mut history = self.history.lock().unwrap();
            let go = decide_escalation(&GateInput {
                mode,
                now,
                last_escalation_ts: history.last_escalation_ts,
                cooldown_ms: self.cooldown_ms,
                hud: &entry.hud,
                digest: &entry.digest,
                last_escalated_digest: history.last_escalated_digest.as_deref(),
                score: &score,
            });
            if go {
                history.last_escalation_ts = now;
                history.last_escalated_digest = Some(entry.digest.clone());
            }
            go
        };

        if !escalate {
            return EscalationOutcome {
                escalated: false,
                score: score.total,
            };
        }

        self.counters.total_escalations.fetch_add(1, Ordering::Relaxed);
        self.counters.last_escalation_at.store(now, Ordering::Relaxed);
        info!(
            tick = entry.id,
            score = score.total,
            reasons = ?score.reasons,
            "escalating"
        );

        // The tick's window was sized for the prompt; the outgoing message
        // is sized for the mode, so re-assemble with the mode's preset.
        let message_window = assemble_window(
            &self.feed,
            &self.sense,
            self.max_age_ms,
            &window.current_app,
            mode.richness().preset(),
        );
        let message = build_escalation_message(entry, &message_window, mode);
        let idem_key = format!("hud-{}-{}", entry.id, now);
        let mut delivery = self.delivery(message, idem_key, mode);
        delivery.digest = Some(entry.digest.clone());
        tokio::spawn(delivery.run());

        EscalationOutcome {
            escalated: true,
            score: score.total,
        }
    }
}

// ── Delivery ────────────────────────────────────────────────────────────

/// One fire-and-forget delivery: RPC primary, HTTP hook fall-back.
struct Delivery {
    gateway: Option<Arc<AssistantGateway>>,
    http: reqwest::Client,
    hook_url: Option<String>,
    hook_token: Option<String>,
    session_key: String,
    feed: Arc<FeedBuffer>,
    outbound: mpsc::UnboundedSender<OverlayMessage>,
    counters: Arc<Counters>,
    mode: EscalationMode,
    message: String,
    idem_key: String,
    digest: Option<String>,
}

impl Delivery {
    async fn run(self) {
        let ready_gateway = self
            .gateway
            .clone()
            .filter(|gateway| gateway.is_connected());
        let rpc_ready = ready_gateway.is_some();

        if let Some(gateway) = ready_gateway {
            match gateway.agent_wait(&self.message, &self.idem_key).await {
                Ok(result) => {
                    self.handle_reply(result);
                    return;
                }
                Err(Error::Rpc { code, message }) => {
                    warn!(code, "gateway rejected escalation: {}", message);
                    self.push_error_note(&format!("[err] assistant rpc {}: {}", code, message));
                    return;
                }
                Err(Error::GatewayTimeout(ms)) => {
                    // The assistant may still be processing; never retried.
                    warn!(timeout_ms = ms, "assistant reply timed out");
                    return;
                }
                Err(err) if err.is_transient() => {
                    warn!(error = %err, "gateway transport failed, falling back to hook");
                    self.push_error_note(&format!("[err] assistant transport: {}", err));
                }
                Err(err) => {
                    warn!(error = %err, "gateway delivery failed");
                    self.push_error_note(&format!("[err] assistant delivery: {}", err));
                    return;
                }
            }
        }

        if self.hook_url.is_some() {
            self.post_hook().await;
        } else if !rpc_ready {
            debug!("no assistant transport available, escalation skipped");
        }
    }

    fn handle_reply(&self, result: serde_json::Value) {
        let now = sinain_core::now_ms();
        let text = result["payloads"]
            .as_array()
            .map(|payloads| {
                payloads
                    .iter()
                    .filter_map(|payload| payload["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            self.counters.total_no_reply.fetch_add(1, Ordering::Relaxed);
            if self.mode.is_eager() {
                if let Some(digest) = &self.digest {
                    self.push_agent_item(&format!("{} {}", ROBOT_GLYPH, digest));
                }
            } else {
                debug!("assistant had nothing to add");
            }
            return;
        }

        self.counters.total_responses.fetch_add(1, Ordering::Relaxed);
        self.counters.last_response_at.store(now, Ordering::Relaxed);
        self.push_agent_item(&format!("{} {}", ROBOT_GLYPH, text.trim()));
    }

    fn push_agent_item(&self, text: &str) {
        let capped: String = if text.chars().count() > RESPONSE_CHAR_CAP {
            text.chars().take(RESPONSE_CHAR_CAP).collect()
        } else {
            text.to_string()
        };
        match self.feed.push(
            FeedDraft::new(FeedSource::Assistant, capped)
                .channel(FeedChannel::Agent)
                .priority(FeedPriority::High),
        ) {
            Ok(item) => {
                let _ = self.outbound.send(OverlayMessage::feed(&item));
            }
            Err(err) => warn!(error = %err, "assistant feed push rejected"),
        }
    }

    fn push_error_note(&self, text: &str) {
        self.counters.total_errors.fetch_add(1, Ordering::Relaxed);
        self.counters
            .last_error_at
            .store(sinain_core::now_ms(), Ordering::Relaxed);
        if let Ok(item) = self.feed.push(FeedDraft::new(FeedSource::System, text)) {
            let _ = self.outbound.send(OverlayMessage::feed(&item));
        }
    }

    async fn post_hook(&self) {
        let url = self.hook_url.as_ref().unwrap();
        let body = serde_json::json!({
            "message": self.message,
            "name": "sinain-core",
            "sessionKey": self.session_key,
            "wakeMode": "now",
            "deliver": false,
        });

        let mut request = self.http.post(url).json(&body);
        if let Some(token) = &self.hook_token {
            request = request.bearer_auth(token);
        }

        // Fire-and-forget: the hook response body is never captured.
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(status = %response.status(), "hook delivery accepted");
            }
            Ok(response) => {
                warn!(status = %response.status(), "hook delivery rejected");
                self.counters.total_errors.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .last_error_at
                    .store(sinain_core::now_ms(), Ordering::Relaxed);
            }
            Err(err) => {
                warn!(error = %err, "hook delivery failed");
                self.counters.total_errors.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .last_error_at
                    .store(sinain_core::now_ms(), Ordering::Relaxed);
            }
        }
    }
}
