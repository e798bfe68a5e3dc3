//! The analyzer — Sinain's tick engine
//!
//! One task owns the whole loop, so at most one tick is ever in flight.
//! Triggers: a debounce window armed by new events, and a max-interval
//! timer that fires even when nothing arrived. Cooldown gates the debounce
//! path only; the interval tick fires inside cooldown.
//!
//! A tick: assemble window → build prompt → walk the model chain → parse →
//! record entry → push HUD → write situation → escalate → trace + journal.
//! Failures are fatal to the tick, never to the engine.

use crate::parse::parse_tick_output;
use crate::prompt::build_prompt;
use crate::situation::SituationWriter;
use sinain_buffers::{assemble_window, FeedBuffer, SenseBuffer};
use sinain_core::config::AgentConfig;
use sinain_core::{
    AgentEntry, CaptureControl, ConnectionStatus, ContextWindow, EntryContext,
    EscalationModeState, FeedChannel, FeedDraft, FeedPriority, FeedSource, OverlayMessage,
    PERIODIC_PREFIX,
};
use sinain_llm::{ChainOutcome, ModelAttempt, ModelChain};
use sinain_telemetry::{Profiler, Span, SpanStatus, TraceBuilder, TraceJournal, TraceMetrics, Tracer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// Rough blended cost per token, used only for trace accounting.
const COST_PER_INPUT_TOKEN: f64 = 0.15e-6;
const COST_PER_OUTPUT_TOKEN: f64 = 0.60e-6;

/// Outcome the escalation layer reports back into the tick trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct EscalationOutcome {
    pub escalated: bool,
    pub score: u32,
}

/// Seam between the tick engine and the escalation pipeline. The engine
/// holds the sink; the sink never calls back into the engine.
#[async_trait::async_trait]
pub trait EscalationSink: Send + Sync {
    async fn on_tick(&self, entry: &AgentEntry, window: &ContextWindow) -> EscalationOutcome;
}

/// Cheap handle for ingress paths to signal "a new event arrived".
#[derive(Clone)]
pub struct AnalyzerHandle {
    wake_tx: mpsc::UnboundedSender<()>,
}

impl AnalyzerHandle {
    pub fn wake(&self) {
        let _ = self.wake_tx.send(());
    }
}

pub struct Analyzer {
    config: AgentConfig,
    chain: ModelChain,
    feed: Arc<FeedBuffer>,
    sense: Arc<SenseBuffer>,
    tracer: Arc<Tracer>,
    journal: Option<Arc<TraceJournal>>,
    profiler: Arc<Profiler>,
    escalator: Arc<dyn EscalationSink>,
    outbound: mpsc::UnboundedSender<OverlayMessage>,
    control: Arc<CaptureControl>,
    connection: Arc<ConnectionStatus>,
    /// Richness follows the current escalation mode: lean for off and
    /// selective, standard for focus, rich for rich.
    mode: Arc<EscalationModeState>,
    situation: Option<SituationWriter>,
    wake_rx: mpsc::UnboundedReceiver<()>,
    tick_id: u64,
    last_hud: String,
}

#[allow(clippy::too_many_arguments)]
impl Analyzer {
    pub fn new(
        config: AgentConfig,
        chain: ModelChain,
        feed: Arc<FeedBuffer>,
        sense: Arc<SenseBuffer>,
        tracer: Arc<Tracer>,
        journal: Option<Arc<TraceJournal>>,
        profiler: Arc<Profiler>,
        escalator: Arc<dyn EscalationSink>,
        outbound: mpsc::UnboundedSender<OverlayMessage>,
        control: Arc<CaptureControl>,
        connection: Arc<ConnectionStatus>,
        mode: Arc<EscalationModeState>,
        situation: Option<SituationWriter>,
    ) -> (Self, AnalyzerHandle) {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let analyzer = Self {
            config,
            chain,
            feed,
            sense,
            tracer,
            journal,
            profiler,
            escalator,
            outbound,
            control,
            connection,
            mode,
            situation,
            wake_rx,
            tick_id: 0,
            last_hud: String::new(),
        };
        (analyzer, AnalyzerHandle { wake_tx })
    }

    /// Run the scheduling loop until cancelled. The loop body runs ticks
    /// inline, which is what guarantees single-in-flight.
    pub async fn run(mut self, cancel: CancellationToken) {
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let max_interval = Duration::from_millis(self.config.max_interval_ms);
        let cooldown = Duration::from_millis(self.config.cooldown_ms);

        let mut interval_deadline = Instant::now() + max_interval;
        let mut debounce_deadline: Option<Instant> = None;
        let mut cooldown_until = Instant::now();

        info!(
            debounce_ms = self.config.debounce_ms,
            max_interval_ms = self.config.max_interval_ms,
            cooldown_ms = self.config.cooldown_ms,
            "analyzer started"
        );

        loop {
            let next = debounce_deadline
                .map(|deadline| deadline.min(interval_deadline))
                .unwrap_or(interval_deadline);

            tokio::select! {
                _ = cancel.cancelled() => break,

                wake = self.wake_rx.recv() => {
                    if wake.is_none() {
                        break;
                    }
                    // Debounce triggers are rejected during cooldown; the
                    // interval deadline is untouched either way.
                    if Instant::now() >= cooldown_until {
                        debounce_deadline = Some(Instant::now() + debounce);
                    }
                }

                _ = tokio::time::sleep_until(next.into()) => {
                    debounce_deadline = None;
                    self.tick().await;
                    let now = Instant::now();
                    interval_deadline = now + max_interval;
                    cooldown_until = now + cooldown;
                }
            }
        }

        info!(ticks = self.tick_id, "analyzer stopped");
    }

    async fn tick(&mut self) {
        self.tick_id += 1;
        let tick_id = self.tick_id;
        let tick_start = Instant::now();
        let richness = self.mode.get().richness();
        let mut trace = TraceBuilder::new(tick_id);

        // Context build: one atomic snapshot of each buffer.
        let span = trace.start_span("contextBuild");
        let window = assemble_window(
            &self.feed,
            &self.sense,
            self.config.max_age_ms,
            &self.sense.latest_app(),
            richness.preset(),
        );
        trace.end_span(
            span,
            serde_json::json!({
                "screenEvents": window.screen.len(),
                "audioEntries": window.audio.len(),
                "currentApp": window.current_app,
            }),
        );

        let now = sinain_core::now_ms();
        let messages = build_prompt(&window, now);

        let outcome = match self.chain.run(messages).await {
            Ok(outcome) => outcome,
            Err(exhausted) => {
                record_attempt_spans(&mut trace, &exhausted.attempts, now);
                let err = sinain_core::Error::ModelUnavailable(
                    exhausted.attempts.len(),
                    exhausted
                        .attempts
                        .last()
                        .and_then(|attempt| attempt.error.clone())
                        .unwrap_or_else(|| "no models configured".into()),
                );
                warn!(tick = tick_id, error = %err, "tick failed");
                let total = tick_start.elapsed().as_millis() as u64;
                let trace = trace.finish(TraceMetrics {
                    total_latency_ms: total,
                    context_screen_events: window.screen.len(),
                    context_audio_entries: window.audio.len(),
                    context_richness: richness.as_str().to_string(),
                    ..Default::default()
                });
                self.record_trace(trace);
                return;
            }
        };
        record_attempt_spans(&mut trace, &outcome.attempts, now);

        let entry = self.build_entry(tick_id, now, &outcome, &window);
        let hud_changed = entry.hud != self.last_hud;

        if self.config.push_to_feed && hud_changed && !entry.hud.is_empty() {
            match self.feed.push(FeedDraft {
                source: FeedSource::Agent,
                channel: FeedChannel::Stream,
                priority: FeedPriority::Normal,
                text: format!("{} {}", PERIODIC_PREFIX, entry.hud),
            }) {
                Ok(item) => {
                    let _ = self.outbound.send(OverlayMessage::feed(&item));
                }
                Err(err) => warn!(error = %err, "hud feed push rejected"),
            }
        }
        self.last_hud = entry.hud.clone();
        let _ = self.outbound.send(OverlayMessage::Status {
            audio: self.control.audio(),
            screen: self.control.screen(),
            connection: self.connection.get(),
        });

        if let Some(writer) = &self.situation {
            writer.write(&entry, &window);
        }

        let escalation_start = Instant::now();
        let escalation = self.escalator.on_tick(&entry, &window).await;
        let escalation_latency = escalation_start.elapsed().as_millis() as u64;

        info!(
            tick = tick_id,
            model = %entry.model,
            latency_ms = entry.latency_ms,
            parsed_ok = entry.parsed_ok,
            escalated = escalation.escalated,
            "tick complete"
        );
        self.profiler
            .timer_record("tick", tick_start.elapsed().as_secs_f64() * 1000.0);
        self.profiler.gauge("feed.version", self.feed.version() as f64);
        self.profiler
            .gauge("sense.version", self.sense.version() as f64);

        let trace = trace.finish(TraceMetrics {
            total_latency_ms: tick_start.elapsed().as_millis() as u64,
            llm_latency_ms: entry.latency_ms,
            llm_input_tokens: entry.tokens_in,
            llm_output_tokens: entry.tokens_out,
            llm_cost: entry.tokens_in as f64 * COST_PER_INPUT_TOKEN
                + entry.tokens_out as f64 * COST_PER_OUTPUT_TOKEN,
            escalated: escalation.escalated,
            escalation_score: escalation.score,
            escalation_latency_ms: escalation.escalated.then_some(escalation_latency),
            context_screen_events: window.screen.len(),
            context_audio_entries: window.audio.len(),
            context_richness: richness.as_str().to_string(),
            digest_length: entry.digest.len(),
            hud_changed,
        });
        self.record_trace(trace);
    }

    fn build_entry(
        &self,
        tick_id: u64,
        now: u64,
        outcome: &ChainOutcome,
        window: &ContextWindow,
    ) -> AgentEntry {
        let parsed = parse_tick_output(&outcome.completion.text);
        let llm_latency_ms = outcome
            .attempts
            .last()
            .map(|attempt| attempt.latency_ms)
            .unwrap_or(0);
        AgentEntry {
            id: tick_id,
            ts: now,
            model: outcome.model.clone(),
            latency_ms: llm_latency_ms,
            tokens_in: outcome.completion.tokens_in,
            tokens_out: outcome.completion.tokens_out,
            parsed_ok: parsed.parsed_ok,
            hud: parsed.hud,
            digest: parsed.digest,
            context_freshness_ms: window.freshness_ms(now),
            context: EntryContext {
                current_app: window.current_app.clone(),
                app_history_names: window
                    .app_history
                    .iter()
                    .map(|visit| visit.app.clone())
                    .collect(),
                audio_count: window.audio.len(),
                screen_count: window.screen.len(),
            },
        }
    }

    fn record_trace(&self, trace: sinain_telemetry::Trace) {
        if let Some(journal) = &self.journal {
            journal.append(&trace);
        }
        self.tracer.record(trace);
    }
}

/// Turn the chain's attempt log into `llmCall` spans, failures first.
fn record_attempt_spans(trace: &mut TraceBuilder, attempts: &[ModelAttempt], chain_start: u64) {
    let mut cursor = chain_start;
    for attempt in attempts {
        let end = cursor + attempt.latency_ms;
        trace.record_span(Span {
            name: "llmCall".to_string(),
            start_ts: cursor,
            end_ts: end,
            attributes: serde_json::json!({
                "model": attempt.model,
                "latencyMs": attempt.latency_ms,
            }),
            status: if attempt.error.is_some() {
                SpanStatus::Error
            } else {
                SpanStatus::Ok
            },
            error: attempt.error.clone(),
        });
        cursor = end;
    }
}
