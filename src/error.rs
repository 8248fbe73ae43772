//! Error taxonomy shared across the crate.

use thiserror::Error;

/// Errors surfaced by the client core.
///
/// `DecodeError` is part of the taxonomy so internal code has a typed error
/// to construct and propagate with `?`, but it is caught and logged at the
/// Connection/Dispatcher boundary — public request methods never return it.
#[derive(Debug, Error, Clone)]
pub enum ClientError {
    #[error("transport error: {0}")]
    TransportError(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("timed out waiting for command '{command}'")]
    Timeout { command: String },

    #[error("login rejected: cooldown, retry in {seconds}s")]
    LoginCooldown { seconds: u32 },

    #[error("login rejected: auth failure (code {code})")]
    AuthFailed { code: i64 },

    #[error("invalid request: {0}")]
    ValidationError(String),

    #[error("server rejected request (code {code}): {message}")]
    ServerRejected { code: i64, message: String },

    #[error("not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, ClientError>;
