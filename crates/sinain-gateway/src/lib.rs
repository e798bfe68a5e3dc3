//! Sinain Gateway - Overlay fan-out socket server and ingress HTTP surface

pub mod overlay;
pub mod server;
pub mod ws;

pub use overlay::{OverlayHub, MAX_REPLAY, SPAWN_TASK_TTL_MS};
pub use server::{serve, EscalationControl, HubState};
