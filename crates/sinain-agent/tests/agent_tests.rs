//! Tests for sinain-agent: output parsing, prompt shape, situation file,
//! and the tick engine driven end-to-end with a scripted provider

use sinain_agent::*;
use sinain_buffers::{assemble_window, FeedBuffer, SenseBuffer, SenseDraft};
use sinain_core::config::AgentConfig;
use sinain_core::{
    AgentEntry, CaptureControl, ConnectionStatus, ContextWindow, EntryContext, EscalationMode,
    EscalationModeState, FeedDraft, FeedSource, OverlayMessage, Richness, SenseKind, SenseMeta,
};
use sinain_llm::{ChatCompletion, ChatMessage, ChatProvider, ChatRequest, LlmError, ModelChain};
use sinain_telemetry::{Profiler, SpanStatus, Tracer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

// ===========================================================================
// Parsing
// ===========================================================================

#[test]
fn parse_strict_json() {
    let out = parse_tick_output(r#"{"hud": "Editing analyzer.rs", "digest": "The user edits."}"#);
    assert!(out.parsed_ok);
    assert_eq!(out.hud, "Editing analyzer.rs");
    assert_eq!(out.digest, "The user edits.");
}

#[test]
fn parse_fenced_json() {
    let raw = "```json\n{\"hud\": \"Reading docs\", \"digest\": \"Docs are open.\"}\n```";
    let out = parse_tick_output(raw);
    assert!(out.parsed_ok);
    assert_eq!(out.hud, "Reading docs");
}

#[test]
fn parse_json_embedded_in_prose() {
    let raw = "Sure! Here is the JSON:\n{\"hud\": \"Idle\", \"digest\": \"Nothing new.\"} Hope that helps.";
    let out = parse_tick_output(raw);
    assert!(out.parsed_ok);
    assert_eq!(out.hud, "Idle");
}

#[test]
fn parse_garbage_falls_back_to_raw() {
    let raw = "The user appears to be compiling a large Rust workspace and waiting.";
    let out = parse_tick_output(raw);
    assert!(!out.parsed_ok);
    assert_eq!(out.digest, raw);
    assert_eq!(out.hud, raw); // short enough to fit the 80-char cap
}

#[test]
fn parse_garbage_caps_hud_at_80_chars() {
    let raw = "x".repeat(300);
    let out = parse_tick_output(&raw);
    assert!(!out.parsed_ok);
    assert_eq!(out.hud.chars().count(), 80);
    assert_eq!(out.digest.len(), 300);
}

#[test]
fn parse_multibyte_raw_does_not_split_chars() {
    let raw = "é".repeat(200);
    let out = parse_tick_output(&raw);
    assert_eq!(out.hud.chars().count(), 80);
}

// ===========================================================================
// Prompt
// ===========================================================================

fn window_with_events() -> ContextWindow {
    let feed = FeedBuffer::new();
    let sense = SenseBuffer::new();
    let now = sinain_core::now_ms();
    sense.push(SenseDraft {
        ts: now - 5_000,
        kind: SenseKind::Text,
        ocr: "error: cannot find value `foo`\nin this scope".into(),
        meta: SenseMeta {
            app: "Code".into(),
            window_title: None,
            screen: 0,
            ssim: 0.8,
        },
        roi: None,
        diff: None,
    });
    feed.push(FeedDraft::new(FeedSource::Audio, "why is this not compiling"))
        .unwrap();
    assemble_window(&feed, &sense, 120_000, "Code", Richness::Standard.preset())
}

#[test]
fn prompt_contains_sections_and_collapses_ocr_newlines() {
    let window = window_with_events();
    let messages = build_prompt(&window, sinain_core::now_ms());
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "system");
    let body = &messages[1].content;
    assert!(body.contains("Active app: VS Code"));
    assert!(body.contains("Screen (newest first):"));
    assert!(body.contains("cannot find value `foo` in this scope"));
    assert!(!body.contains("`foo`\nin this scope"), "newlines collapsed");
    assert!(body.contains("Audio transcripts (newest first):"));
    assert!(body.contains("\"why is this not compiling\""));
    assert!(body.contains("STRICT JSON"));
    assert!(body.contains("\"hud\""));
}

#[test]
fn prompt_caps_ocr_to_preset() {
    let feed = FeedBuffer::new();
    let sense = SenseBuffer::new();
    sense.push(SenseDraft {
        ts: sinain_core::now_ms(),
        kind: SenseKind::Text,
        ocr: "y".repeat(5_000),
        meta: SenseMeta {
            app: "Code".into(),
            ..Default::default()
        },
        roi: None,
        diff: None,
    });
    let preset = Richness::Lean.preset();
    let window = assemble_window(&feed, &sense, 120_000, "Code", preset);
    let messages = build_prompt(&window, sinain_core::now_ms());
    let longest_run = messages[1]
        .content
        .split(|c| c != 'y')
        .map(str::len)
        .max()
        .unwrap_or(0);
    assert_eq!(longest_run, preset.max_ocr_chars);
}

// ===========================================================================
// Situation file
// ===========================================================================

fn entry(digest: &str) -> AgentEntry {
    AgentEntry {
        id: 12,
        ts: sinain_core::now_ms(),
        model: "gpt-4o-mini".into(),
        latency_ms: 800,
        tokens_in: 1000,
        tokens_out: 60,
        parsed_ok: true,
        hud: "Debugging tests".into(),
        digest: digest.into(),
        context_freshness_ms: 2_000,
        context: EntryContext::default(),
    }
}

#[test]
fn situation_file_starts_with_header_and_has_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("situation.md");
    let writer = SituationWriter::new(&path);
    let window = window_with_events();
    writer.write(&entry("The user is debugging a failing test."), &window);

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("# Situation\n"));
    assert!(content.contains("## Digest"));
    assert!(content.contains("The user is debugging a failing test."));
    assert!(content.contains("## Active Application"));
    assert!(content.contains("VS Code"));
    assert!(content.contains("## Screen (OCR)"));
    assert!(content.contains("## Audio Transcripts"));
    assert!(content.contains("## Metadata"));
    assert!(content.contains("Parsed OK: true"));
}

#[test]
fn situation_write_leaves_no_tmp_sibling() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("situation.md");
    let writer = SituationWriter::new(&path);
    let window = window_with_events();
    writer.write(&entry("First."), &window);
    writer.write(&entry("Second."), &window);

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["situation.md".to_string()]);
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("Second."));
}

// ===========================================================================
// Tick engine (scripted provider)
// ===========================================================================

struct ScriptedProvider {
    script: Vec<Result<String, &'static str>>,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatCompletion, LlmError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.get(index.min(self.script.len() - 1)) {
            Some(Ok(text)) => Ok(ChatCompletion {
                text: text.clone(),
                tokens_in: 500,
                tokens_out: 40,
            }),
            Some(Err(message)) => Err(LlmError::RequestFailed((*message).to_string())),
            None => unreachable!(),
        }
    }
}

struct RecordingEscalator {
    seen: Mutex<Vec<u64>>,
}

#[async_trait::async_trait]
impl EscalationSink for RecordingEscalator {
    async fn on_tick(&self, entry: &AgentEntry, _window: &ContextWindow) -> EscalationOutcome {
        self.seen.lock().unwrap().push(entry.id);
        EscalationOutcome {
            escalated: false,
            score: 0,
        }
    }
}

struct Harness {
    feed: Arc<FeedBuffer>,
    tracer: Arc<Tracer>,
    escalator: Arc<RecordingEscalator>,
    outbound_rx: tokio::sync::mpsc::UnboundedReceiver<OverlayMessage>,
    handle: AnalyzerHandle,
    cancel: CancellationToken,
}

fn start_analyzer(script: Vec<Result<String, &'static str>>, config: AgentConfig) -> Harness {
    let provider = Arc::new(ScriptedProvider {
        script,
        calls: AtomicUsize::new(0),
    });
    let chain = ModelChain::new(
        provider,
        std::iter::once(config.model.clone())
            .chain(config.fallback_models.iter().cloned())
            .collect(),
    );
    let feed = Arc::new(FeedBuffer::new());
    let sense = Arc::new(SenseBuffer::new());
    let tracer = Arc::new(Tracer::new());
    let profiler = Arc::new(Profiler::new());
    let escalator = Arc::new(RecordingEscalator {
        seen: Mutex::new(Vec::new()),
    });
    let (outbound, outbound_rx) = tokio::sync::mpsc::unbounded_channel();
    let (analyzer, handle) = Analyzer::new(
        config,
        chain,
        feed.clone(),
        sense.clone(),
        tracer.clone(),
        None,
        profiler,
        escalator.clone(),
        outbound,
        Arc::new(CaptureControl::new()),
        Arc::new(ConnectionStatus::new()),
        Arc::new(EscalationModeState::new(EscalationMode::Selective)),
        None,
    );
    let cancel = CancellationToken::new();
    tokio::spawn(analyzer.run(cancel.clone()));
    Harness {
        feed,
        tracer,
        escalator,
        outbound_rx,
        handle,
        cancel,
    }
}

fn fast_config() -> AgentConfig {
    AgentConfig {
        debounce_ms: 20,
        max_interval_ms: 60_000,
        cooldown_ms: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn debounced_tick_produces_entry_trace_and_hud() {
    let mut harness = start_analyzer(
        vec![Ok(r#"{"hud": "Writing tests", "digest": "Tests are being written."}"#.into())],
        fast_config(),
    );

    harness.handle.wake();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    // trace recorded with contextBuild then llmCall, both ok
    let traces = harness.tracer.get_traces(0, 10);
    assert_eq!(traces.len(), 1);
    let spans: Vec<&str> = traces[0].spans.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(spans, vec!["contextBuild", "llmCall"]);
    assert!(traces[0].spans.iter().all(|s| s.status == SpanStatus::Ok));
    assert!(traces[0].metrics.total_latency_ms >= traces[0].metrics.llm_latency_ms);
    assert!(traces[0].metrics.hud_changed);

    // HUD pushed to feed with the periodic prefix, hidden from overlay queries
    let all = harness.feed.query(0);
    assert_eq!(all.len(), 1);
    assert!(all[0].text.starts_with("[PERIODIC]"));
    assert!(all[0].text.contains("Writing tests"));
    assert!(harness.feed.query_overlay(0).is_empty());

    // escalator consulted once, status broadcast observed
    assert_eq!(*harness.escalator.seen.lock().unwrap(), vec![1]);
    let mut saw_status = false;
    while let Ok(msg) = harness.outbound_rx.try_recv() {
        if matches!(msg, OverlayMessage::Status { .. }) {
            saw_status = true;
        }
    }
    assert!(saw_status);

    harness.cancel.cancel();
}

#[tokio::test]
async fn unchanged_hud_not_repushed() {
    let mut config = fast_config();
    config.cooldown_ms = 0;
    let harness = start_analyzer(
        vec![Ok(r#"{"hud": "Same", "digest": "Same digest."}"#.into())],
        config,
    );

    harness.handle.wake();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    harness.handle.wake();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    assert_eq!(harness.escalator.seen.lock().unwrap().len(), 2);
    assert_eq!(harness.feed.query(0).len(), 1, "HUD pushed only when changed");
    harness.cancel.cancel();
}

#[tokio::test]
async fn model_chain_failure_recorded_as_error_then_ok_span() {
    let mut config = fast_config();
    config.model = "primary".into();
    config.fallback_models = vec!["backup".into()];
    let harness = start_analyzer(
        vec![
            Err("500: primary down"),
            Ok(r#"{"hud": "Recovered", "digest": "Fallback model answered."}"#.into()),
        ],
        config,
    );

    harness.handle.wake();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let traces = harness.tracer.get_traces(0, 10);
    assert_eq!(traces.len(), 1);
    let llm_spans: Vec<_> = traces[0]
        .spans
        .iter()
        .filter(|s| s.name == "llmCall")
        .collect();
    assert_eq!(llm_spans.len(), 2);
    assert_eq!(llm_spans[0].status, SpanStatus::Error);
    assert_eq!(llm_spans[1].status, SpanStatus::Ok);
    assert_eq!(llm_spans[1].attributes["model"], "backup");
    harness.cancel.cancel();
}

#[tokio::test]
async fn exhausted_chain_still_produces_error_trace() {
    let mut config = fast_config();
    config.model = "only".into();
    let harness = start_analyzer(vec![Err("503: dead")], config);

    harness.handle.wake();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let traces = harness.tracer.get_traces(0, 10);
    assert_eq!(traces.len(), 1);
    let llm_span = traces[0].spans.iter().find(|s| s.name == "llmCall").unwrap();
    assert_eq!(llm_span.status, SpanStatus::Error);
    assert!(llm_span.error.as_deref().unwrap().contains("503"));
    // no entry side effects
    assert!(harness.feed.query(0).is_empty());
    assert!(harness.escalator.seen.lock().unwrap().is_empty());
    harness.cancel.cancel();
}

#[tokio::test]
async fn cooldown_rejects_debounce_trigger() {
    let mut config = fast_config();
    config.cooldown_ms = 60_000;
    let harness = start_analyzer(
        vec![Ok(r#"{"hud": "One", "digest": "One."}"#.into())],
        config,
    );

    harness.handle.wake();
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    harness.handle.wake(); // inside cooldown: must not arm a debounce
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;

    assert_eq!(harness.tracer.len(), 1);
    harness.cancel.cancel();
}

// ChatMessage helper sanity, used across the prompt tests above.
#[test]
fn chat_message_roles() {
    assert_eq!(ChatMessage::system("a").role, "system");
    assert_eq!(ChatMessage::user("b").role, "user");
}
