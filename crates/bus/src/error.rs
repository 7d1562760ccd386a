//! Error types for the bus crate

use thiserror::Error;

/// Failure reported by an event handler
///
/// Handler failures never propagate to the publisher; the bus logs them and
/// moves on to the next handler.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn msg(message: impl std::fmt::Display) -> Self {
        HandlerError::Failed(message.to_string())
    }
}

/// Wire codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    #[error("Topic mismatch: frame topic {frame} carries event {event}")]
    TopicMismatch { frame: String, event: String },
}

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Subscription failed: {0}")]
    Subscribe(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Channel closed")]
    ChannelClosed,
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Connection(e.to_string())
    }
}

/// Distributed bus errors
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, BusError>;
