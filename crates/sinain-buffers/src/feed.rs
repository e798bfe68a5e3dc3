//! Feed buffer — bounded, monotonically-versioned store of feed items
//!
//! Single writer preferred, any number of concurrent readers. Readers get
//! value copies; an item is never mutated after push. Pruning removes from
//! the oldest end only.

use sinain_core::{Error, FeedDraft, FeedItem, FeedSource, Result, PERIODIC_PREFIX};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const FEED_CAPACITY: usize = 100;

pub struct FeedBuffer {
    inner: Mutex<Inner>,
}

struct Inner {
    items: VecDeque<FeedItem>,
    capacity: usize,
    next_id: u64,
    version: u64,
}

impl Default for FeedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedBuffer {
    pub fn new() -> Self {
        Self::with_capacity(FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                capacity,
                next_id: 1,
                version: 0,
            }),
        }
    }

    /// Assign the next id, stamp the timestamp, bump the version, truncate
    /// from the head if over capacity. Returns the stored item.
    pub fn push(&self, draft: FeedDraft) -> Result<FeedItem> {
        if draft.text.trim().is_empty() {
            return Err(Error::bad_input("feed item requires non-empty text"));
        }
        let mut inner = self.inner.lock().unwrap();
        let item = FeedItem {
            id: inner.next_id,
            ts: sinain_core::now_ms(),
            source: draft.source,
            channel: draft.channel,
            priority: draft.priority,
            text: draft.text,
        };
        inner.next_id += 1;
        inner.version += 1;
        inner.items.push_back(item.clone());
        while inner.items.len() > inner.capacity {
            inner.items.pop_front();
        }
        Ok(item)
    }

    /// Items with id strictly greater than `after_id`, in id order.
    pub fn query(&self, after_id: u64) -> Vec<FeedItem> {
        let inner = self.inner.lock().unwrap();
        inner
            .items
            .iter()
            .filter(|item| item.id > after_id)
            .cloned()
            .collect()
    }

    /// Overlay-directed slice: same as `query` but periodic HUD lines are
    /// skipped (the overlay already received those as live pushes).
    pub fn query_overlay(&self, after_id: u64) -> Vec<FeedItem> {
        let inner = self.inner.lock().unwrap();
        inner
            .items
            .iter()
            .filter(|item| item.id > after_id && !item.text.starts_with(PERIODIC_PREFIX))
            .cloned()
            .collect()
    }

    pub fn query_by_time(&self, since_ms: u64) -> Vec<FeedItem> {
        let inner = self.inner.lock().unwrap();
        inner
            .items
            .iter()
            .filter(|item| item.ts >= since_ms)
            .cloned()
            .collect()
    }

    pub fn query_by_source(&self, source: FeedSource, since_ms: u64) -> Vec<FeedItem> {
        let inner = self.inner.lock().unwrap();
        inner
            .items
            .iter()
            .filter(|item| item.source == source && item.ts >= since_ms)
            .cloned()
            .collect()
    }

    /// Full point-in-time copy of the retained window, in id order. The
    /// assembler reads this once so a tick never sees a torn view.
    pub fn snapshot(&self) -> Vec<FeedItem> {
        self.inner.lock().unwrap().items.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<FeedItem> {
        self.inner.lock().unwrap().items.back().cloned()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn version(&self) -> u64 {
        self.inner.lock().unwrap().version
    }
}
