//! Core types for Sinain — feed items, sense events, context windows, tick entries

use serde::{Deserialize, Serialize};

/// Feed items whose text starts with this prefix are hidden from
/// overlay-directed queries (they reach the overlay as live pushes only).
pub const PERIODIC_PREFIX: &str = "[PERIODIC]";

/// Milliseconds since the Unix epoch, local clock.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

// ── Feed ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    Audio,
    Sense,
    Agent,
    Assistant,
    System,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedChannel {
    Stream,
    Agent,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedPriority {
    Normal,
    High,
    Urgent,
}

/// One entry in the feed buffer. `id` is assigned by the buffer and never
/// reused; the item is immutable after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: u64,
    pub ts: u64,
    pub source: FeedSource,
    pub channel: FeedChannel,
    pub priority: FeedPriority,
    pub text: String,
}

/// A feed item before the buffer assigns identity.
#[derive(Clone, Debug)]
pub struct FeedDraft {
    pub source: FeedSource,
    pub channel: FeedChannel,
    pub priority: FeedPriority,
    pub text: String,
}

impl FeedDraft {
    pub fn new(source: FeedSource, text: impl Into<String>) -> Self {
        Self {
            source,
            channel: FeedChannel::Stream,
            priority: FeedPriority::Normal,
            text: text.into(),
        }
    }

    pub fn channel(mut self, channel: FeedChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn priority(mut self, priority: FeedPriority) -> Self {
        self.priority = priority;
        self
    }
}

// ── Sense ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SenseKind {
    Text,
    Visual,
    Context,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SenseMeta {
    #[serde(default)]
    pub app: String,
    #[serde(default, rename = "windowTitle", skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    #[serde(default)]
    pub screen: u32,
    #[serde(default)]
    pub ssim: f64,
}

/// A screen-capture-derived observation. `ts` is the producer's clock,
/// `received_at` the local clock; future producer timestamps are accepted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SenseEvent {
    pub id: u64,
    pub ts: u64,
    #[serde(rename = "receivedAt")]
    pub received_at: u64,
    #[serde(rename = "type")]
    pub kind: SenseKind,
    #[serde(default)]
    pub ocr: String,
    #[serde(default)]
    pub meta: SenseMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<serde_json::Value>,
}

impl SenseEvent {
    /// Drop the binary `data` payloads from `roi`/`diff`, keeping their
    /// remaining metadata keys. Used for `metaOnly` queries.
    pub fn strip_payloads(&mut self) {
        for field in [&mut self.roi, &mut self.diff] {
            if let Some(serde_json::Value::Object(map)) = field {
                map.remove("data");
            }
        }
    }
}

// ── Spawn tasks ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpawnStatus {
    Spawned,
    Polling,
    Completed,
    Failed,
    Timeout,
}

impl SpawnStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Timeout)
    }
}

/// Lifecycle record for an external task surfaced to the overlay.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpawnTask {
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub label: String,
    pub status: SpawnStatus,
    #[serde(rename = "startedAt")]
    pub started_at: u64,
    #[serde(rename = "completedAt", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    #[serde(rename = "resultPreview", skip_serializing_if = "Option::is_none")]
    pub result_preview: Option<String>,
}

impl SpawnTask {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ── Richness ────────────────────────────────────────────────────────────

/// Bounds on how much raw context is packed into prompts and escalation
/// messages.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RichnessPreset {
    pub max_screen_events: usize,
    pub max_audio_entries: usize,
    pub max_ocr_chars: usize,
    pub max_transcript_chars: usize,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Richness {
    Lean,
    #[default]
    Standard,
    Rich,
}

impl Richness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Richness::Lean => "lean",
            Richness::Standard => "standard",
            Richness::Rich => "rich",
        }
    }

    pub fn preset(&self) -> RichnessPreset {
        match self {
            Richness::Lean => RichnessPreset {
                max_screen_events: 3,
                max_audio_entries: 5,
                max_ocr_chars: 500,
                max_transcript_chars: 200,
            },
            Richness::Standard => RichnessPreset {
                max_screen_events: 8,
                max_audio_entries: 15,
                max_ocr_chars: 1500,
                max_transcript_chars: 400,
            },
            Richness::Rich => RichnessPreset {
                max_screen_events: 20,
                max_audio_entries: 40,
                max_ocr_chars: 4000,
                max_transcript_chars: 800,
            },
        }
    }
}

// ── Context window ──────────────────────────────────────────────────────

/// One app-focus transition observed in the sense stream.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AppVisit {
    pub app: String,
    pub ts: u64,
}

/// Ephemeral point-in-time snapshot handed to a tick. Slices are newest
/// first and already truncated to the preset's bounds.
#[derive(Clone, Debug)]
pub struct ContextWindow {
    pub screen: Vec<SenseEvent>,
    pub audio: Vec<FeedItem>,
    pub newest_event_ts: u64,
    pub current_app: String,
    pub app_history: Vec<AppVisit>,
    pub preset: RichnessPreset,
}

impl ContextWindow {
    /// Age of the newest event relative to `now`, or 0 when empty.
    pub fn freshness_ms(&self, now: u64) -> u64 {
        if self.newest_event_ts == 0 {
            0
        } else {
            now.saturating_sub(self.newest_event_ts)
        }
    }
}

// ── Tick outcome ────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntryContext {
    #[serde(rename = "currentApp")]
    pub current_app: String,
    #[serde(rename = "appHistoryNames")]
    pub app_history_names: Vec<String>,
    #[serde(rename = "audioCount")]
    pub audio_count: usize,
    #[serde(rename = "screenCount")]
    pub screen_count: usize,
}

/// The outcome of one tick. `id` is the tick sequence number.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: u64,
    pub ts: u64,
    pub model: String,
    #[serde(rename = "latencyMs")]
    pub latency_ms: u64,
    #[serde(rename = "tokensIn")]
    pub tokens_in: u64,
    #[serde(rename = "tokensOut")]
    pub tokens_out: u64,
    #[serde(rename = "parsedOk")]
    pub parsed_ok: bool,
    pub hud: String,
    pub digest: String,
    #[serde(rename = "contextFreshnessMs")]
    pub context_freshness_ms: u64,
    pub context: EntryContext,
}

// ── Modes and status ────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EscalationMode {
    Off,
    #[default]
    Selective,
    Focus,
    Rich,
}

impl EscalationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Selective => "selective",
            Self::Focus => "focus",
            Self::Rich => "rich",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Self::Off),
            "selective" => Some(Self::Selective),
            "focus" => Some(Self::Focus),
            "rich" => Some(Self::Rich),
            _ => None,
        }
    }

    /// Modes that want an answer even for a repeated or low-scoring digest.
    pub fn is_eager(&self) -> bool {
        matches!(self, Self::Focus | Self::Rich)
    }

    /// Richness used when sizing escalation messages for this mode.
    pub fn richness(&self) -> Richness {
        match self {
            Self::Rich => Richness::Rich,
            Self::Focus => Richness::Standard,
            _ => Richness::Lean,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AudioState {
    Active,
    Muted,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScreenState {
    Active,
    Off,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Connecting,
}
