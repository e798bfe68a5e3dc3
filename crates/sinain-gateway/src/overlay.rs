//! Overlay hub — ordered fan-out with replay and spawn-task buffering
//!
//! All producers publish through one mpsc channel; the relay task applies
//! each message to the buffers and broadcasts it while holding the buffer
//! lock. A connecting client snapshots the buffers and subscribes under
//! the same lock, so replay + live never duplicates and never drops.

use sinain_core::{OverlayMessage, SpawnTask};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Feed messages re-sent to each newly connecting overlay.
pub const MAX_REPLAY: usize = 20;

/// Terminal spawn tasks older than this are evicted.
pub const SPAWN_TASK_TTL_MS: u64 = 120_000;

const BROADCAST_CAPACITY: usize = 256;

struct Buffers {
    replay: VecDeque<OverlayMessage>,
    // keyed by task_id, insertion order preserved
    spawn_tasks: Vec<SpawnTask>,
}

pub struct OverlayHub {
    buffers: Mutex<Buffers>,
    tx: broadcast::Sender<OverlayMessage>,
    clients: AtomicUsize,
}

impl Default for OverlayHub {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            buffers: Mutex::new(Buffers {
                replay: VecDeque::with_capacity(MAX_REPLAY),
                spawn_tasks: Vec::new(),
            }),
            tx,
            clients: AtomicUsize::new(0),
        }
    }

    /// Publish one message to all connected clients, updating the replay
    /// and spawn-task buffers first.
    pub fn publish(&self, message: OverlayMessage) {
        let mut buffers = self.buffers.lock().unwrap();
        match &message {
            OverlayMessage::Feed { .. } => {
                buffers.replay.push_back(message.clone());
                while buffers.replay.len() > MAX_REPLAY {
                    buffers.replay.pop_front();
                }
            }
            OverlayMessage::SpawnTask { task } => {
                let merged = upsert_spawn_task(&mut buffers.spawn_tasks, task.clone());
                prune_spawn_tasks(&mut buffers.spawn_tasks, sinain_core::now_ms());
                // broadcast the canonical merged record
                let _ = self.tx.send(OverlayMessage::SpawnTask { task: merged });
                return;
            }
            _ => {}
        }
        let _ = self.tx.send(message);
    }

    /// Snapshot for a newly accepted connection: the replay slice, the
    /// surviving spawn tasks, and a live subscription — all under one lock
    /// so nothing published concurrently is seen twice or missed.
    pub fn connect(
        &self,
    ) -> (
        Vec<OverlayMessage>,
        Vec<SpawnTask>,
        broadcast::Receiver<OverlayMessage>,
    ) {
        let mut buffers = self.buffers.lock().unwrap();
        prune_spawn_tasks(&mut buffers.spawn_tasks, sinain_core::now_ms());
        let replay = buffers.replay.iter().cloned().collect();
        let tasks = buffers.spawn_tasks.clone();
        (replay, tasks, self.tx.subscribe())
    }

    /// Track an accepted client. Returns true on the 0→1 edge.
    pub fn client_connected(&self) -> bool {
        let previous = self.clients.fetch_add(1, Ordering::SeqCst);
        info!(clients = previous + 1, "overlay client connected");
        previous == 0
    }

    pub fn client_disconnected(&self) {
        let previous = self.clients.fetch_sub(1, Ordering::SeqCst);
        info!(clients = previous.saturating_sub(1), "overlay client disconnected");
    }

    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    /// Run the relay: drain the producer channel into `publish` until the
    /// channel closes or cancellation.
    pub async fn run_relay(
        &self,
        mut rx: mpsc::UnboundedReceiver<OverlayMessage>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = rx.recv() => {
                    let Some(message) = message else { break };
                    self.publish(message);
                }
            }
        }
        debug!("overlay relay stopped");
    }
}

/// Insert or update by task id. `started_at` is immutable and a terminal
/// `completed_at` is set exactly once.
fn upsert_spawn_task(tasks: &mut Vec<SpawnTask>, incoming: SpawnTask) -> SpawnTask {
    if let Some(existing) = tasks.iter_mut().find(|task| task.task_id == incoming.task_id) {
        existing.label = incoming.label;
        existing.status = incoming.status;
        if incoming.result_preview.is_some() {
            existing.result_preview = incoming.result_preview;
        }
        if incoming.status.is_terminal() && existing.completed_at.is_none() {
            existing.completed_at = incoming.completed_at.or_else(|| Some(sinain_core::now_ms()));
        }
        existing.clone()
    } else {
        tasks.push(incoming.clone());
        incoming
    }
}

fn prune_spawn_tasks(tasks: &mut Vec<SpawnTask>, now: u64) {
    tasks.retain(|task| {
        !(task.is_terminal()
            && task
                .completed_at
                .is_some_and(|done| now.saturating_sub(done) > SPAWN_TASK_TTL_MS))
    });
}
