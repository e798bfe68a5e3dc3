//! Tests for sinain-gateway: replay buffer, spawn-task lifecycle buffer,
//! and connection-snapshot semantics of the overlay hub

use sinain_core::{
    FeedChannel, FeedItem, FeedPriority, FeedSource, OverlayMessage, SpawnStatus, SpawnTask,
};
use sinain_gateway::{OverlayHub, MAX_REPLAY, SPAWN_TASK_TTL_MS};

fn feed_message(id: u64) -> OverlayMessage {
    OverlayMessage::feed(&FeedItem {
        id,
        ts: sinain_core::now_ms(),
        source: FeedSource::System,
        channel: FeedChannel::Stream,
        priority: FeedPriority::Normal,
        text: format!("item {}", id),
    })
}

fn task(task_id: &str, status: SpawnStatus, completed_at: Option<u64>) -> SpawnTask {
    SpawnTask {
        task_id: task_id.into(),
        label: format!("task {}", task_id),
        status,
        started_at: 1_000,
        completed_at,
        result_preview: None,
    }
}

// ===========================================================================
// Replay buffer
// ===========================================================================

#[test]
fn replay_keeps_last_20_feed_messages_in_order() {
    let hub = OverlayHub::new();
    for id in 1..=25 {
        hub.publish(feed_message(id));
    }
    let (replay, _, _) = hub.connect();
    assert_eq!(replay.len(), MAX_REPLAY);
    let texts: Vec<String> = replay
        .iter()
        .map(|message| match message {
            OverlayMessage::Feed { text, .. } => text.clone(),
            other => panic!("unexpected message in replay: {:?}", other),
        })
        .collect();
    assert_eq!(texts.first().unwrap(), "item 6");
    assert_eq!(texts.last().unwrap(), "item 25");
}

#[test]
fn replay_ignores_non_feed_messages() {
    let hub = OverlayHub::new();
    hub.publish(feed_message(1));
    hub.publish(OverlayMessage::Ping {
        ts: sinain_core::now_ms(),
    });
    let (replay, _, _) = hub.connect();
    assert_eq!(replay.len(), 1);
}

#[tokio::test]
async fn live_subscription_sees_messages_published_after_connect() {
    let hub = OverlayHub::new();
    hub.publish(feed_message(1));
    let (replay, _, mut rx) = hub.connect();
    assert_eq!(replay.len(), 1);

    hub.publish(feed_message(2));
    let live = rx.recv().await.unwrap();
    match live {
        OverlayMessage::Feed { text, .. } => assert_eq!(text, "item 2"),
        other => panic!("unexpected live message: {:?}", other),
    }
}

// ===========================================================================
// Spawn-task buffer
// ===========================================================================

#[test]
fn spawn_task_upsert_keeps_started_at() {
    let hub = OverlayHub::new();
    hub.publish(OverlayMessage::spawn_task(task("t-1", SpawnStatus::Spawned, None)));

    let mut update = task("t-1", SpawnStatus::Polling, None);
    update.started_at = 9_999; // producers must not be able to rewrite this
    hub.publish(OverlayMessage::spawn_task(update));

    let (_, tasks, _) = hub.connect();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, SpawnStatus::Polling);
    assert_eq!(tasks[0].started_at, 1_000);
}

#[test]
fn spawn_task_terminal_sets_completed_at_once() {
    let hub = OverlayHub::new();
    hub.publish(OverlayMessage::spawn_task(task("t-2", SpawnStatus::Spawned, None)));
    hub.publish(OverlayMessage::spawn_task(task(
        "t-2",
        SpawnStatus::Completed,
        Some(5_000),
    )));
    // a second terminal update must not move completed_at
    hub.publish(OverlayMessage::spawn_task(task(
        "t-2",
        SpawnStatus::Completed,
        Some(8_000),
    )));

    let (_, tasks, _) = hub.connect();
    assert_eq!(tasks.len(), 0, "completed long ago is evicted on connect");
}

#[test]
fn spawn_task_recent_terminal_survives_connect() {
    let hub = OverlayHub::new();
    let now = sinain_core::now_ms();
    hub.publish(OverlayMessage::spawn_task(task(
        "t-3",
        SpawnStatus::Completed,
        Some(now - 1_000),
    )));
    let (_, tasks, _) = hub.connect();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].completed_at, Some(now - 1_000));
}

#[test]
fn spawn_task_past_ttl_not_delivered_to_new_clients() {
    let hub = OverlayHub::new();
    let now = sinain_core::now_ms();
    hub.publish(OverlayMessage::spawn_task(task(
        "t-old",
        SpawnStatus::Completed,
        Some(now - SPAWN_TASK_TTL_MS - 1_000),
    )));
    hub.publish(OverlayMessage::spawn_task(task("t-live", SpawnStatus::Polling, None)));

    let (_, tasks, _) = hub.connect();
    let ids: Vec<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
    assert_eq!(ids, vec!["t-live"]);
}

#[test]
fn spawn_task_non_terminal_never_evicted() {
    let hub = OverlayHub::new();
    hub.publish(OverlayMessage::spawn_task(SpawnTask {
        task_id: "t-4".into(),
        label: "long poll".into(),
        status: SpawnStatus::Polling,
        started_at: 1, // ancient, but not terminal
        completed_at: None,
        result_preview: None,
    }));
    let (_, tasks, _) = hub.connect();
    assert_eq!(tasks.len(), 1);
}

#[tokio::test]
async fn spawn_task_broadcasts_merged_record() {
    let hub = OverlayHub::new();
    hub.publish(OverlayMessage::spawn_task(task("t-5", SpawnStatus::Spawned, None)));
    let (_, _, mut rx) = hub.connect();

    let mut update = task("t-5", SpawnStatus::Completed, None);
    update.started_at = 42; // ignored by the upsert
    hub.publish(OverlayMessage::spawn_task(update));

    match rx.recv().await.unwrap() {
        OverlayMessage::SpawnTask { task } => {
            assert_eq!(task.started_at, 1_000);
            assert_eq!(task.status, SpawnStatus::Completed);
            assert!(task.completed_at.is_some(), "terminal transition stamps completion");
        }
        other => panic!("unexpected broadcast: {:?}", other),
    }
}

// ===========================================================================
// Client counting
// ===========================================================================

#[test]
fn client_count_edges() {
    let hub = OverlayHub::new();
    assert!(hub.client_connected(), "0→1 edge");
    assert!(!hub.client_connected(), "1→2 is not an edge");
    hub.client_disconnected();
    hub.client_disconnected();
    assert_eq!(hub.client_count(), 0);
    assert!(hub.client_connected(), "0→1 edge again");
}
