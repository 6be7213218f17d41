//! Error types for bufstream-core.

use std::io;
use thiserror::Error;

use crate::message::MessageCode;

/// Result type for bufstream-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Legacy status value for a successful call.
pub const BS_OK: u32 = 0;
/// Legacy status value for a failed read or write against the backing resource.
pub const BS_IO_ERROR: u32 = 1;
/// Legacy status value for every other failure.
pub const BS_ERROR: u32 = 0xFFFF_FFFF;

/// Error type for bufstream-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred on the backing resource.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A lease could not be granted.
    #[error("Lease unavailable: requested {requested} bytes, {available} available")]
    Unavailable { requested: usize, available: usize },

    /// Fewer bytes reached the backing resource than were handed in.
    #[error("Short transfer: requested {requested} bytes, transferred {actual}")]
    ShortTransfer { requested: usize, actual: usize },

    /// The call is not valid for the channel's current mode or state.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A message payload does not match the layout for its code.
    #[error("Payload size mismatch for {code}: expected {expected} bytes, got {actual}")]
    PayloadSize {
        code: MessageCode,
        expected: usize,
        actual: usize,
    },

    /// A message payload exceeds the maximum record size.
    #[error("Payload for {code} is {size} bytes, larger than the {max} byte limit")]
    PayloadTooLarge {
        code: MessageCode,
        size: usize,
        max: usize,
    },

    /// A message reached a channel with nowhere to deliver it.
    #[error("Unhandled message {0}")]
    Unhandled(MessageCode),

    /// The channel was already finished.
    #[error("Channel is closed")]
    Closed,

    /// Metadata slot number out of range.
    #[error("Invalid metadata slot: {slot} (max: {max})")]
    InvalidSlot { slot: u32, max: u32 },

    /// Unsupported feature or stream format.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Malformed input data.
    #[error("Invalid format: {0}")]
    Format(String),
}

impl Error {
    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Map onto the legacy status values.
    pub fn status_code(&self) -> u32 {
        match self {
            Self::Io(_) | Self::ShortTransfer { .. } => BS_IO_ERROR,
            _ => BS_ERROR,
        }
    }
}

/// Map a call result onto the legacy status values.
pub fn status_of<T>(result: &Result<T>) -> u32 {
    match result {
        Ok(_) => BS_OK,
        Err(e) => e.status_code(),
    }
}
