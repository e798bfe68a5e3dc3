//! Sense buffer — bounded store of screen-capture observations
//!
//! Producer timestamps are kept as sent (a future `ts` relative to the
//! local clock is accepted); `received_at` is stamped from the local clock
//! at push time.

use sinain_core::{SenseEvent, SenseKind, SenseMeta};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const SENSE_CAPACITY: usize = 30;

/// A sense event before the buffer assigns identity. `kind` and `ts` are
/// the required identity fields; the ingress surface rejects bodies
/// missing either before a draft is ever built.
#[derive(Clone, Debug)]
pub struct SenseDraft {
    pub ts: u64,
    pub kind: SenseKind,
    pub ocr: String,
    pub meta: SenseMeta,
    pub roi: Option<serde_json::Value>,
    pub diff: Option<serde_json::Value>,
}

pub struct SenseBuffer {
    inner: Mutex<Inner>,
}

struct Inner {
    events: VecDeque<SenseEvent>,
    capacity: usize,
    next_id: u64,
    version: u64,
}

impl Default for SenseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SenseBuffer {
    pub fn new() -> Self {
        Self::with_capacity(SENSE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: VecDeque::with_capacity(capacity),
                capacity,
                next_id: 1,
                version: 0,
            }),
        }
    }

    pub fn push(&self, draft: SenseDraft) -> SenseEvent {
        let mut inner = self.inner.lock().unwrap();
        let event = SenseEvent {
            id: inner.next_id,
            ts: draft.ts,
            received_at: sinain_core::now_ms(),
            kind: draft.kind,
            ocr: draft.ocr,
            meta: draft.meta,
            roi: draft.roi,
            diff: draft.diff,
        };
        inner.next_id += 1;
        inner.version += 1;
        inner.events.push_back(event.clone());
        while inner.events.len() > inner.capacity {
            inner.events.pop_front();
        }
        event
    }

    /// Events with id strictly greater than `after_id`, in id order. When
    /// `meta_only`, the binary `roi.data`/`diff.data` payloads are stripped
    /// from the returned copies.
    pub fn query(&self, after_id: u64, meta_only: bool) -> Vec<SenseEvent> {
        let inner = self.inner.lock().unwrap();
        inner
            .events
            .iter()
            .filter(|event| event.id > after_id)
            .cloned()
            .map(|mut event| {
                if meta_only {
                    event.strip_payloads();
                }
                event
            })
            .collect()
    }

    /// Most recent `meta.app`, or "unknown" when the buffer is empty or the
    /// newest event carries no app.
    pub fn latest_app(&self) -> String {
        let inner = self.inner.lock().unwrap();
        inner
            .events
            .iter()
            .rev()
            .find(|event| !event.meta.app.is_empty())
            .map(|event| event.meta.app.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Distinct adjacent `meta.app` values since `since_ms`, paired with the
    /// producer timestamp of the first event of each run. Non-adjacent
    /// repeats are kept as separate transitions.
    pub fn app_history(&self, since_ms: u64) -> Vec<(String, u64)> {
        let inner = self.inner.lock().unwrap();
        let mut history: Vec<(String, u64)> = Vec::new();
        for event in inner.events.iter() {
            if event.ts < since_ms || event.meta.app.is_empty() {
                continue;
            }
            match history.last() {
                Some((last, _)) if *last == event.meta.app => {}
                _ => history.push((event.meta.app.clone(), event.ts)),
            }
        }
        history
    }

    /// Full point-in-time copy of the retained window, in id order.
    pub fn snapshot(&self) -> Vec<SenseEvent> {
        self.inner.lock().unwrap().events.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<SenseEvent> {
        self.inner.lock().unwrap().events.back().cloned()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    pub fn version(&self) -> u64 {
        self.inner.lock().unwrap().version
    }
}
