//! Error handling
//!
//! None of these errors is fatal: transport failures feed the reconnect
//! path, decode failures drop a single frame, handler failures are isolated
//! to the handler that raised them.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

pub type StreamResult<T> = Result<T, StreamError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    /// Connection refused, dropped or errored
    #[error("Transport error: {0}")]
    Transport(String),

    /// Inbound frame did not have the expected shape
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A subscriber callback failed during dispatch
    #[error("Handler error: {0}")]
    Handler(String),

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),
}

/// Reasons a single frame is dropped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("frame has no event_type")]
    MissingEventType,

    #[error("unknown event_type '{0}'")]
    UnknownEventType(String),

    #[error("event_type '{0}' is internal and cannot arrive over the wire")]
    ReservedEventType(String),

    #[error("invalid '{kind}' payload: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("binary frame is not valid UTF-8")]
    NonUtf8Binary,
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Decode(DecodeError::InvalidJson(err.to_string()))
    }
}

impl From<tungstenite::Error> for StreamError {
    fn from(err: tungstenite::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

impl StreamError {
    pub fn is_transport(&self) -> bool {
        matches!(self, StreamError::Transport(_))
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, StreamError::Decode(_))
    }
}
