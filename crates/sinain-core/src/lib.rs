//! Sinain Core - Data model, wire protocol, config, and error handling

pub mod config;
pub mod control;
pub mod error;
pub mod protocol;
pub mod types;

pub use config::HubConfig;
pub use control::{CaptureControl, ConnectionStatus, EscalationModeState};
pub use error::{Error, Result};
pub use protocol::*;
pub use types::*;
