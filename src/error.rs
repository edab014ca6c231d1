//! Error taxonomy for the control-socket client.
//!
//! Every failure at or below the [`ControlSession`](crate::protocol::ControlSession)
//! surfaces as exactly one [`ClientError`]. Lower layers keep their own error
//! enums ([`FrameError`], [`NoiseError`]) and are converted here, at the session
//! boundary, so callers only ever match on one type.
use thiserror::Error;

use crate::protocol::{FrameError, NoiseError};

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing or invalid settings detected before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Socket connect/read/write failure or an oversized outgoing frame.
    #[error("transport error: {0}")]
    Transport(#[source] FrameError),

    #[error("control handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("noise handshake failed: {0}")]
    HandshakeFailure(String),

    #[error("noise encryption failed: {0}")]
    EncryptionFailure(String),

    #[error("control socket closed while awaiting response")]
    ConnectionClosed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server error ({code}): {message}")]
    Server { code: String, message: String },

    #[error("client already closed")]
    ClientClosed,
}

impl ClientError {
    /// Whether a caller-side retry loop may reasonably try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::ConnectionClosed)
    }

    pub(crate) fn handshake(err: NoiseError) -> Self {
        ClientError::HandshakeFailure(err.to_string())
    }

    pub(crate) fn encryption(err: NoiseError) -> Self {
        ClientError::EncryptionFailure(err.to_string())
    }
}

impl From<FrameError> for ClientError {
    fn from(value: FrameError) -> Self {
        match value {
            FrameError::InvalidLength { .. } => ClientError::Protocol(value.to_string()),
            other => ClientError::Transport(other),
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(value: std::io::Error) -> Self {
        ClientError::Transport(FrameError::Io(value))
    }
}

impl From<bincode::error::EncodeError> for ClientError {
    fn from(value: bincode::error::EncodeError) -> Self {
        ClientError::Protocol(format!("failed to encode message: {value}"))
    }
}

impl From<bincode::error::DecodeError> for ClientError {
    fn from(value: bincode::error::DecodeError) -> Self {
        ClientError::Protocol(format!("failed to decode message: {value}"))
    }
}
