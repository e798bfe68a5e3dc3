//! Process wiring — build the buffers, telemetry, escalation, tick engine
//! and the HTTP/WS surface, run them, and tear them down in reverse order.

use sinain_agent::{Analyzer, EscalationSink, SituationWriter};
use sinain_buffers::{FeedBuffer, SenseBuffer};
use sinain_core::{
    CaptureControl, ConnectionStatus, EscalationMode, EscalationModeState, FeedDraft, FeedSource,
    GatewayEvent, HubConfig, OverlayMessage, SpawnTask,
};
use sinain_escalation::{GatewayClientConfig, Orchestrator, OrchestratorConfig};
use sinain_gateway::{EscalationControl, HubState, OverlayHub};
use sinain_llm::{HttpChatClient, ModelChain};
use sinain_telemetry::{Profiler, TraceJournal, Tracer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Adapter giving the HTTP surface its narrow view of the orchestrator.
struct OrchestratorControl(Arc<Orchestrator>);

impl EscalationControl for OrchestratorControl {
    fn mode(&self) -> EscalationMode {
        self.0.mode()
    }

    fn set_mode(&self, mode: EscalationMode) {
        self.0.set_mode(mode);
    }

    fn send_direct(&self, text: String) {
        self.0.send_direct(text);
    }

    fn counters(&self) -> serde_json::Value {
        self.0.counters()
    }
}

pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // Buffers and telemetry come up first, torn down last.
    let feed = Arc::new(FeedBuffer::new());
    let sense = Arc::new(SenseBuffer::new());
    let tracer = Arc::new(Tracer::new());
    let profiler = Arc::new(Profiler::new());
    profiler.clone().spawn_sampling(cancel.clone());
    let journal = config
        .trace_enabled()
        .then(|| Arc::new(TraceJournal::new(config.trace_dir())));

    let control = Arc::new(CaptureControl::new());
    let connection = Arc::new(ConnectionStatus::new());
    let mode_state = Arc::new(EscalationModeState::new(config.escalation.mode));

    // Overlay fan-out: producers publish through one channel, the hub
    // relays with replay/spawn buffering.
    let overlay = Arc::new(OverlayHub::new());
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<OverlayMessage>();
    {
        let overlay = overlay.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { overlay.run_relay(outbound_rx, cancel).await });
    }

    // Escalation pipeline.
    let gateway_config = config
        .openclaw
        .gateway_ws_url
        .as_ref()
        .map(|url| GatewayClientConfig {
            ws_url: url.clone(),
            token: config.openclaw.gateway_token.clone(),
            session_key: config.openclaw.session_key.clone(),
        });
    let orchestrator = Orchestrator::new(
        OrchestratorConfig {
            cooldown_ms: config.escalation.cooldown_ms,
            max_age_ms: config.agent.max_age_ms,
            gateway: gateway_config,
            hook_url: config.openclaw.hook_url.clone(),
            hook_token: config.openclaw.hook_token.clone(),
            session_key: config.openclaw.session_key.clone(),
        },
        mode_state.clone(),
        connection.clone(),
        feed.clone(),
        sense.clone(),
        outbound_tx.clone(),
    );
    orchestrator.set_gateway_event_callback(gateway_event_callback(
        feed.clone(),
        outbound_tx.clone(),
    ));

    // Tick engine. A missing model key disables the agent, nothing else.
    let api_key = config.agent.api_key.clone();
    let analyzer_handle = if config.agent.enabled {
        match api_key {
            Some(key) => {
                let provider = Arc::new(HttpChatClient::new(config.agent.base_url.clone(), key));
                let chain = ModelChain::new(provider, config.model_chain())
                    .with_limits(config.agent.max_tokens, config.agent.temperature);
                let situation = config
                    .situation_md_enabled()
                    .then(|| SituationWriter::new(config.situation_md_path()));
                let escalator: Arc<dyn EscalationSink> = orchestrator.clone();
                let (analyzer, handle) = Analyzer::new(
                    config.agent.clone(),
                    chain,
                    feed.clone(),
                    sense.clone(),
                    tracer.clone(),
                    journal.clone(),
                    profiler.clone(),
                    escalator,
                    outbound_tx.clone(),
                    control.clone(),
                    connection.clone(),
                    mode_state.clone(),
                    situation,
                );
                tokio::spawn(analyzer.run(cancel.clone()));
                Some(handle)
            }
            None => {
                warn!("agent enabled but no model key configured; analyzer disabled");
                None
            }
        }
    } else {
        info!("agent disabled by config");
        None
    };
    // HTTP/WS surface.
    let on_ingress: Arc<dyn Fn() + Send + Sync> = match analyzer_handle {
        Some(handle) => Arc::new(move || handle.wake()),
        None => Arc::new(|| {}),
    };
    let state = Arc::new(HubState {
        feed,
        sense,
        tracer,
        profiler,
        control,
        connection,
        escalation: Arc::new(OrchestratorControl(orchestrator.clone())),
        overlay,
        on_ingress,
        shutdown: cancel.clone(),
        started_at: std::time::Instant::now(),
    });

    let port = config.ws_port();
    let server = tokio::spawn(sinain_gateway::serve(state, port));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // Reverse of startup: surface + timers first, then the RPC socket,
    // then flush the journal.
    cancel.cancel();
    if let Some(gateway) = orchestrator.gateway() {
        gateway.stop();
    }
    match tokio::time::timeout(Duration::from_secs(5), server).await {
        Ok(result) => result??,
        Err(_) => warn!("server drain timed out"),
    }
    if let Some(journal) = &journal {
        journal.flush();
    }
    info!("hub stopped");
    Ok(())
}

/// Route unsolicited gateway events into the feed and the overlay socket.
fn gateway_event_callback(
    feed: Arc<FeedBuffer>,
    outbound: mpsc::UnboundedSender<OverlayMessage>,
) -> sinain_escalation::GatewayEventCallback {
    Arc::new(move |event: &GatewayEvent| match event.event.as_str() {
        "spawn_task" => match serde_json::from_value::<SpawnTask>(event.data.clone()) {
            Ok(task) => {
                let _ = outbound.send(OverlayMessage::spawn_task(task));
            }
            Err(err) => warn!(error = %err, "malformed spawn_task event"),
        },
        "agent.feed" => {
            if let Some(text) = event.data["text"].as_str() {
                if let Ok(item) = feed.push(FeedDraft::new(FeedSource::Assistant, text)) {
                    let _ = outbound.send(OverlayMessage::feed(&item));
                }
            }
        }
        other => tracing::debug!(event = other, "unhandled gateway event"),
    })
}
