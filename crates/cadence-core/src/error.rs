//! Error types for Cadence.

use thiserror::Error;

use crate::types::PlaybackState;

/// Result type alias using Cadence's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Cadence.
#[derive(Error, Debug)]
pub enum Error {
    // Collection errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Queue overflow: capacity {capacity} exhausted")]
    QueueOverflow { capacity: usize },

    #[error("Queue underflow: queue is empty")]
    QueueUnderflow,

    // Audio errors
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    #[error("Audio device error: {0}")]
    Device(String),

    // Player errors
    #[error("Cannot {action} while {from}")]
    InvalidStateTransition {
        from: PlaybackState,
        action: &'static str,
    },

    #[error("Decode worker is not running")]
    WorkerUnavailable,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if the error was caused by calling a player operation in the wrong state.
    pub const fn is_state_error(&self) -> bool {
        matches!(self, Self::InvalidStateTransition { .. })
    }

    /// Returns true if the error indicates misuse of an internal queue.
    ///
    /// These never surface under correct usage of the player.
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::QueueOverflow { .. } | Self::QueueUnderflow)
    }
}
