//! Tests for sinain-buffers: feed/sense ring buffers and the assembler

use sinain_buffers::*;
use sinain_core::{
    FeedChannel, FeedDraft, FeedPriority, FeedSource, Richness, SenseKind, SenseMeta,
};

fn feed_draft(text: &str) -> FeedDraft {
    FeedDraft::new(FeedSource::System, text)
}

fn audio_draft(text: &str) -> FeedDraft {
    FeedDraft::new(FeedSource::Audio, text)
}

fn sense_draft(app: &str, ts: u64, ocr: &str) -> SenseDraft {
    SenseDraft {
        ts,
        kind: SenseKind::Text,
        ocr: ocr.to_string(),
        meta: SenseMeta {
            app: app.to_string(),
            window_title: None,
            screen: 0,
            ssim: 0.9,
        },
        roi: None,
        diff: None,
    }
}

// ===========================================================================
// Feed buffer
// ===========================================================================

#[test]
fn feed_ids_strictly_increasing() {
    let feed = FeedBuffer::new();
    for i in 0..10 {
        feed.push(feed_draft(&format!("item {}", i))).unwrap();
    }
    let items = feed.query(0);
    let ids: Vec<u64> = items.iter().map(|item| item.id).collect();
    assert_eq!(ids, (1..=10).collect::<Vec<u64>>());
}

#[test]
fn feed_honours_capacity_and_prunes_oldest() {
    let feed = FeedBuffer::with_capacity(5);
    for i in 0..12 {
        feed.push(feed_draft(&format!("item {}", i))).unwrap();
    }
    assert_eq!(feed.size(), 5);
    let items = feed.query(0);
    // N - cap + 1 = 12 - 5 + 1 = 8
    assert_eq!(items.first().unwrap().id, 8);
    assert_eq!(items.last().unwrap().id, 12);
}

#[test]
fn feed_query_after_returns_exactly_newer() {
    let feed = FeedBuffer::new();
    for i in 0..6 {
        feed.push(feed_draft(&format!("item {}", i))).unwrap();
    }
    let items = feed.query(4);
    let ids: Vec<u64> = items.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![5, 6]);
    assert!(feed.query(6).is_empty());
}

#[test]
fn feed_version_bumps_on_every_push() {
    let feed = FeedBuffer::new();
    assert_eq!(feed.version(), 0);
    feed.push(feed_draft("a")).unwrap();
    feed.push(feed_draft("b")).unwrap();
    assert_eq!(feed.version(), 2);
}

#[test]
fn feed_rejects_empty_text() {
    let feed = FeedBuffer::new();
    assert!(feed.push(feed_draft("   ")).is_err());
    assert_eq!(feed.size(), 0);
    assert_eq!(feed.version(), 0, "rejected push must not bump the version");
}

#[test]
fn feed_overlay_query_skips_periodic() {
    let feed = FeedBuffer::new();
    feed.push(feed_draft("visible one")).unwrap();
    feed.push(feed_draft("[PERIODIC] hud refresh")).unwrap();
    feed.push(feed_draft("visible two")).unwrap();

    let overlay = feed.query_overlay(0);
    assert_eq!(overlay.len(), 2);
    assert!(overlay.iter().all(|item| !item.text.starts_with("[PERIODIC]")));

    // the raw query still sees everything
    assert_eq!(feed.query(0).len(), 3);
}

#[test]
fn feed_query_by_source() {
    let feed = FeedBuffer::new();
    feed.push(audio_draft("said something")).unwrap();
    feed.push(feed_draft("system note")).unwrap();
    feed.push(audio_draft("said more")).unwrap();

    let audio = feed.query_by_source(FeedSource::Audio, 0);
    assert_eq!(audio.len(), 2);
    assert!(audio.iter().all(|item| item.source == FeedSource::Audio));
}

#[test]
fn feed_query_by_time() {
    let feed = FeedBuffer::new();
    let before = sinain_core::now_ms();
    feed.push(feed_draft("one")).unwrap();
    feed.push(feed_draft("two")).unwrap();
    assert_eq!(feed.query_by_time(before).len(), 2);
    assert!(feed.query_by_time(sinain_core::now_ms() + 10_000).is_empty());
}

#[test]
fn feed_latest_and_priorities() {
    let feed = FeedBuffer::new();
    feed.push(feed_draft("first")).unwrap();
    feed.push(
        FeedDraft::new(FeedSource::Agent, "urgent thing")
            .channel(FeedChannel::Agent)
            .priority(FeedPriority::Urgent),
    )
    .unwrap();
    let latest = feed.latest().unwrap();
    assert_eq!(latest.text, "urgent thing");
    assert_eq!(latest.priority, FeedPriority::Urgent);
}

// ===========================================================================
// Sense buffer
// ===========================================================================

#[test]
fn sense_capacity_and_ids() {
    let sense = SenseBuffer::with_capacity(3);
    for i in 0..5 {
        sense.push(sense_draft("Code", 1_000 + i, "text"));
    }
    assert_eq!(sense.size(), 3);
    let events = sense.query(0, false);
    assert_eq!(events.first().unwrap().id, 3);
    assert_eq!(events.last().unwrap().id, 5);
}

#[test]
fn sense_meta_only_strips_binary_payloads() {
    let sense = SenseBuffer::new();
    let mut draft = sense_draft("Code", 1, "err");
    draft.roi = Some(serde_json::json!({ "data": "AAAA", "w": 10 }));
    draft.diff = Some(serde_json::json!({ "data": "BBBB" }));
    sense.push(draft);

    let full = sense.query(0, false);
    assert!(full[0].roi.as_ref().unwrap().get("data").is_some());

    let stripped = sense.query(0, true);
    assert!(stripped[0].roi.as_ref().unwrap().get("data").is_none());
    assert_eq!(stripped[0].roi.as_ref().unwrap()["w"], 10);

    // stripping is on the copy, not the stored event
    assert!(sense.query(0, false)[0].roi.as_ref().unwrap().get("data").is_some());
}

#[test]
fn sense_latest_app_unknown_when_empty() {
    let sense = SenseBuffer::new();
    assert_eq!(sense.latest_app(), "unknown");
    sense.push(sense_draft("Figma", 1, ""));
    assert_eq!(sense.latest_app(), "Figma");
}

#[test]
fn sense_app_history_collapses_adjacent_only() {
    let sense = SenseBuffer::new();
    sense.push(sense_draft("Code", 10, ""));
    sense.push(sense_draft("Code", 20, ""));
    sense.push(sense_draft("Chrome", 30, ""));
    sense.push(sense_draft("Code", 40, ""));

    let history = sense.app_history(0);
    let names: Vec<&str> = history.iter().map(|(app, _)| app.as_str()).collect();
    assert_eq!(names, vec!["Code", "Chrome", "Code"]);
    assert_eq!(history[0].1, 10, "run keeps the timestamp of its first event");
}

#[test]
fn sense_accepts_future_producer_ts() {
    let sense = SenseBuffer::new();
    let future = sinain_core::now_ms() + 60_000;
    let event = sense.push(sense_draft("Code", future, ""));
    assert_eq!(event.ts, future);
    assert!(event.received_at <= future);
}

// ===========================================================================
// App normalizer
// ===========================================================================

#[test]
fn normalizer_strips_extensions_and_folds_aliases() {
    assert_eq!(normalize_app_name("Google Chrome"), "Chrome");
    assert_eq!(normalize_app_name("iTerm2"), "Terminal");
    assert_eq!(normalize_app_name("Code"), "VS Code");
    assert_eq!(normalize_app_name("Figma.app"), "Figma");
    assert_eq!(normalize_app_name("Obsidian"), "Obsidian");
    assert_eq!(normalize_app_name(""), "unknown");
    assert_eq!(normalize_app_name("  "), "unknown");
}

// ===========================================================================
// Context-window assembler
// ===========================================================================

#[test]
fn window_truncates_to_preset_and_sorts_newest_first() {
    let feed = FeedBuffer::new();
    let sense = SenseBuffer::new();
    for i in 0..10 {
        sense.push(sense_draft("Code", sinain_core::now_ms() - i * 10, "line"));
    }
    for i in 0..8 {
        feed.push(audio_draft(&format!("transcript {}", i))).unwrap();
    }

    let preset = Richness::Lean.preset();
    let window = assemble_window(&feed, &sense, 120_000, "Code", preset);

    assert_eq!(window.screen.len(), preset.max_screen_events);
    assert_eq!(window.audio.len(), preset.max_audio_entries);
    assert!(window
        .screen
        .windows(2)
        .all(|pair| pair[0].ts >= pair[1].ts));
    assert!(window.newest_event_ts > 0);
    assert_eq!(window.current_app, "VS Code");
}

#[test]
fn window_excludes_events_outside_age_bound() {
    let feed = FeedBuffer::new();
    let sense = SenseBuffer::new();
    let now = sinain_core::now_ms();
    sense.push(sense_draft("Code", now.saturating_sub(300_000), "stale"));
    sense.push(sense_draft("Code", now, "fresh"));

    let window = assemble_window(&feed, &sense, 120_000, "Code", Richness::Standard.preset());
    assert_eq!(window.screen.len(), 1);
    assert_eq!(window.screen[0].ocr, "fresh");
}

#[test]
fn window_empty_buffers_yield_zero_freshness() {
    let feed = FeedBuffer::new();
    let sense = SenseBuffer::new();
    let window = assemble_window(&feed, &sense, 120_000, "", Richness::Standard.preset());
    assert_eq!(window.newest_event_ts, 0);
    assert_eq!(window.freshness_ms(sinain_core::now_ms()), 0);
    assert_eq!(window.current_app, "unknown");
    assert!(window.app_history.is_empty());
}

#[test]
fn window_normalizes_app_history() {
    let feed = FeedBuffer::new();
    let sense = SenseBuffer::new();
    let now = sinain_core::now_ms();
    sense.push(sense_draft("iTerm2", now - 20, ""));
    sense.push(sense_draft("Google Chrome", now - 10, ""));

    let window = assemble_window(&feed, &sense, 120_000, "iTerm2", Richness::Rich.preset());
    let names: Vec<&str> = window.app_history.iter().map(|v| v.app.as_str()).collect();
    assert_eq!(names, vec!["Terminal", "Chrome"]);
    assert_eq!(window.current_app, "Terminal");
}
