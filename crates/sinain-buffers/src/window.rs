//! Context-window assembler
//!
//! Pure function over exactly one snapshot of each buffer: each buffer is
//! read once, so a push racing the assembly never produces a torn view and
//! late pushes never retroactively appear in a started tick.

use crate::apps::normalize_app_name;
use crate::feed::FeedBuffer;
use crate::sense::SenseBuffer;
use sinain_core::{AppVisit, ContextWindow, FeedSource, RichnessPreset};

/// Snapshot a richness-bounded slice of both buffers covering
/// `[now - age_ms, now]`. Slices come back newest first, truncated to the
/// preset's per-kind maxima.
pub fn assemble_window(
    feed: &FeedBuffer,
    sense: &SenseBuffer,
    age_ms: u64,
    current_app: &str,
    preset: RichnessPreset,
) -> ContextWindow {
    let now = sinain_core::now_ms();
    let cutoff = now.saturating_sub(age_ms);

    let sense_events = sense.snapshot();
    let feed_items = feed.snapshot();

    // App history before truncation: distinct adjacent apps over the whole
    // windowed snapshot, normalized for display.
    let mut app_history: Vec<AppVisit> = Vec::new();
    for event in &sense_events {
        if event.ts < cutoff || event.meta.app.is_empty() {
            continue;
        }
        let app = normalize_app_name(&event.meta.app);
        match app_history.last() {
            Some(last) if last.app == app => {}
            _ => app_history.push(AppVisit { app, ts: event.ts }),
        }
    }

    let mut screen: Vec<_> = sense_events
        .into_iter()
        .filter(|event| event.ts >= cutoff)
        .collect();
    screen.sort_by(|a, b| b.ts.cmp(&a.ts));
    screen.truncate(preset.max_screen_events);

    let mut audio: Vec<_> = feed_items
        .into_iter()
        .filter(|item| item.source == FeedSource::Audio && item.ts >= cutoff)
        .collect();
    audio.sort_by(|a, b| b.ts.cmp(&a.ts));
    audio.truncate(preset.max_audio_entries);

    let newest_event_ts = screen
        .iter()
        .map(|event| event.ts)
        .chain(audio.iter().map(|item| item.ts))
        .max()
        .unwrap_or(0);

    ContextWindow {
        screen,
        audio,
        newest_event_ts,
        current_app: normalize_app_name(current_app),
        app_history,
        preset,
    }
}
