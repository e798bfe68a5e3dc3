//! Shared control state — capture collaborator flags and RPC link status
//!
//! These are the few fields mutated from more than one task (overlay
//! commands, the orchestrator, status broadcasts), so they live behind
//! atomics rather than a lock.

use crate::types::{AudioState, ConnectionState, EscalationMode, ScreenState};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// On/off flags for the audio and screen capture collaborators plus the
/// active audio device index.
#[derive(Debug, Default)]
pub struct CaptureControl {
    audio_muted: AtomicBool,
    screen_off: AtomicBool,
    device: AtomicUsize,
}

impl CaptureControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audio(&self) -> AudioState {
        if self.audio_muted.load(Ordering::Relaxed) {
            AudioState::Muted
        } else {
            AudioState::Active
        }
    }

    pub fn screen(&self) -> ScreenState {
        if self.screen_off.load(Ordering::Relaxed) {
            ScreenState::Off
        } else {
            ScreenState::Active
        }
    }

    pub fn toggle_audio(&self) -> AudioState {
        self.audio_muted.fetch_xor(true, Ordering::Relaxed);
        self.audio()
    }

    pub fn toggle_screen(&self) -> ScreenState {
        self.screen_off.fetch_xor(true, Ordering::Relaxed);
        self.screen()
    }

    /// Rotate between the primary (0) and alternate (1) audio device.
    pub fn switch_device(&self) -> usize {
        let next = (self.device.load(Ordering::Relaxed) + 1) % 2;
        self.device.store(next, Ordering::Relaxed);
        next
    }

    pub fn device(&self) -> usize {
        self.device.load(Ordering::Relaxed)
    }
}

/// Current escalation mode, shared between the orchestrator, the HTTP
/// control surface, and the tick engine (which sizes its context window
/// by mode).
#[derive(Debug)]
pub struct EscalationModeState {
    mode: AtomicU8,
}

impl EscalationModeState {
    pub fn new(mode: EscalationMode) -> Self {
        Self {
            mode: AtomicU8::new(encode_mode(mode)),
        }
    }

    pub fn get(&self) -> EscalationMode {
        decode_mode(self.mode.load(Ordering::Relaxed))
    }

    /// Store a new mode, returning the previous one so callers can act on
    /// the off↔non-off edge.
    pub fn set(&self, mode: EscalationMode) -> EscalationMode {
        decode_mode(self.mode.swap(encode_mode(mode), Ordering::Relaxed))
    }
}

fn encode_mode(mode: EscalationMode) -> u8 {
    match mode {
        EscalationMode::Off => 0,
        EscalationMode::Selective => 1,
        EscalationMode::Focus => 2,
        EscalationMode::Rich => 3,
    }
}

fn decode_mode(value: u8) -> EscalationMode {
    match value {
        0 => EscalationMode::Off,
        2 => EscalationMode::Focus,
        3 => EscalationMode::Rich,
        _ => EscalationMode::Selective,
    }
}

/// Connection state of the assistant gateway socket, shared between the
/// RPC client task and status broadcasts.
#[derive(Debug)]
pub struct ConnectionStatus {
    state: AtomicU8,
    authenticated: AtomicBool,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(1),
            authenticated: AtomicBool::new(false),
        }
    }
}

impl ConnectionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, state: ConnectionState) {
        let v = match state {
            ConnectionState::Connected => 0,
            ConnectionState::Disconnected => 1,
            ConnectionState::Connecting => 2,
        };
        self.state.store(v, Ordering::Relaxed);
        if state != ConnectionState::Connected {
            self.authenticated.store(false, Ordering::Relaxed);
        }
    }

    pub fn get(&self) -> ConnectionState {
        match self.state.load(Ordering::Relaxed) {
            0 => ConnectionState::Connected,
            2 => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::Relaxed);
    }

    /// True only when the socket is up and the challenge handshake passed.
    pub fn is_ready(&self) -> bool {
        self.get() == ConnectionState::Connected && self.authenticated.load(Ordering::Relaxed)
    }
}
