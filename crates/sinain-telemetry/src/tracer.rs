//! Per-tick tracer — spans, metrics, and a rolling in-memory window

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const TRACE_WINDOW: usize = 500;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Span {
    pub name: String,
    #[serde(rename = "startTs")]
    pub start_ts: u64,
    #[serde(rename = "endTs")]
    pub end_ts: u64,
    #[serde(default)]
    pub attributes: serde_json::Value,
    pub status: SpanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TraceMetrics {
    #[serde(rename = "totalLatencyMs")]
    pub total_latency_ms: u64,
    #[serde(rename = "llmLatencyMs")]
    pub llm_latency_ms: u64,
    #[serde(rename = "llmInputTokens")]
    pub llm_input_tokens: u64,
    #[serde(rename = "llmOutputTokens")]
    pub llm_output_tokens: u64,
    #[serde(rename = "llmCost")]
    pub llm_cost: f64,
    pub escalated: bool,
    #[serde(rename = "escalationScore")]
    pub escalation_score: u32,
    #[serde(rename = "escalationLatencyMs", skip_serializing_if = "Option::is_none")]
    pub escalation_latency_ms: Option<u64>,
    #[serde(rename = "contextScreenEvents")]
    pub context_screen_events: usize,
    #[serde(rename = "contextAudioEntries")]
    pub context_audio_entries: usize,
    #[serde(rename = "contextRichness")]
    pub context_richness: String,
    #[serde(rename = "digestLength")]
    pub digest_length: usize,
    #[serde(rename = "hudChanged")]
    pub hud_changed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trace {
    #[serde(rename = "traceId")]
    pub trace_id: String,
    #[serde(rename = "tickId")]
    pub tick_id: u64,
    pub ts: u64,
    pub spans: Vec<Span>,
    pub metrics: TraceMetrics,
}

/// Builds one tick's trace. Spans are recorded in start order; a span that
/// is never ended is closed with an error at finish time.
pub struct TraceBuilder {
    trace_id: String,
    tick_id: u64,
    ts: u64,
    spans: Vec<Span>,
}

impl TraceBuilder {
    pub fn new(tick_id: u64) -> Self {
        let ts = sinain_core::now_ms();
        Self {
            trace_id: format!("t{}-{}", tick_id, ts),
            tick_id,
            ts,
            spans: Vec::new(),
        }
    }

    /// Open a span; returns its handle for `end_span`/`end_span_error`.
    pub fn start_span(&mut self, name: &str) -> usize {
        self.spans.push(Span {
            name: name.to_string(),
            start_ts: sinain_core::now_ms(),
            end_ts: 0,
            attributes: serde_json::Value::Null,
            status: SpanStatus::Ok,
            error: None,
        });
        self.spans.len() - 1
    }

    pub fn end_span(&mut self, handle: usize, attributes: serde_json::Value) {
        if let Some(span) = self.spans.get_mut(handle) {
            span.end_ts = sinain_core::now_ms();
            span.attributes = attributes;
            span.status = SpanStatus::Ok;
        }
    }

    /// Append an already-completed span (e.g. one model attempt whose
    /// timing was measured elsewhere).
    pub fn record_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    pub fn end_span_error(&mut self, handle: usize, error: impl Into<String>) {
        if let Some(span) = self.spans.get_mut(handle) {
            span.end_ts = sinain_core::now_ms();
            span.status = SpanStatus::Error;
            span.error = Some(error.into());
        }
    }

    pub fn finish(mut self, metrics: TraceMetrics) -> Trace {
        let now = sinain_core::now_ms();
        for span in &mut self.spans {
            if span.end_ts == 0 {
                span.end_ts = now;
                span.status = SpanStatus::Error;
                span.error.get_or_insert_with(|| "span never ended".into());
            }
        }
        Trace {
            trace_id: self.trace_id,
            tick_id: self.tick_id,
            ts: self.ts,
            spans: self.spans,
            metrics,
        }
    }
}

/// Running stats over the retained trace window.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TraceStats {
    pub count: usize,
    #[serde(rename = "latencyP50")]
    pub latency_p50: u64,
    #[serde(rename = "latencyP95")]
    pub latency_p95: u64,
    #[serde(rename = "avgCostPerTick")]
    pub avg_cost_per_tick: f64,
    #[serde(rename = "totalCost")]
    pub total_cost: f64,
}

/// Rolling FIFO of the last `TRACE_WINDOW` traces.
pub struct Tracer {
    traces: Mutex<VecDeque<Trace>>,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer {
    pub fn new() -> Self {
        Self {
            traces: Mutex::new(VecDeque::with_capacity(TRACE_WINDOW)),
        }
    }

    pub fn record(&self, trace: Trace) {
        let mut traces = self.traces.lock().unwrap();
        traces.push_back(trace);
        while traces.len() > TRACE_WINDOW {
            traces.pop_front();
        }
    }

    /// Traces with tick id strictly greater than `after`, capped at `limit`.
    pub fn get_traces(&self, after: u64, limit: usize) -> Vec<Trace> {
        let traces = self.traces.lock().unwrap();
        traces
            .iter()
            .filter(|trace| trace.tick_id > after)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.traces.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> TraceStats {
        let traces = self.traces.lock().unwrap();
        if traces.is_empty() {
            return TraceStats::default();
        }
        let mut latencies: Vec<u64> = traces
            .iter()
            .map(|trace| trace.metrics.total_latency_ms)
            .collect();
        latencies.sort_unstable();
        let total_cost: f64 = traces.iter().map(|trace| trace.metrics.llm_cost).sum();
        TraceStats {
            count: traces.len(),
            latency_p50: percentile(&latencies, 50),
            latency_p95: percentile(&latencies, 95),
            avg_cost_per_tick: total_cost / traces.len() as f64,
            total_cost,
        }
    }
}

fn percentile(sorted: &[u64], pct: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct * sorted.len()).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}
