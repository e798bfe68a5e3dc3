//! Error types for Sinain

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("model unavailable: {0} models exhausted, last error: {1}")]
    ModelUnavailable(usize, String),

    #[error("gateway closed: {0}")]
    GatewayClosed(String),

    #[error("gateway timeout after {0}ms")]
    GatewayTimeout(u64),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn bad_input(reason: impl Into<String>) -> Self {
        Self::BadInput(reason.into())
    }

    pub fn rpc(code: i32, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// True for failures worth falling back on (network, timeout, closed socket).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::GatewayClosed(_) | Self::GatewayTimeout(_) | Self::ModelUnavailable(..)
        )
    }
}
