//! Engine error types.

use mezcla_core::QueueFull;
use std::path::PathBuf;

/// Errors surfaced by the application-facing engine API.
///
/// The audio thread itself never returns errors; it records events (see
/// [`EngineEvent`](crate::EngineEvent)) that the application drains between
/// callbacks.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A backend or decoder subsystem failed to load.
    #[error("initialization failed: {0}")]
    Init(String),

    /// Device open, start, or render failure.
    #[error("device error: {0}")]
    Device(#[from] mezcla_io::Error),

    /// File open or packet decode failure.
    #[error("decode error in {path:?}: {source}")]
    Decode {
        /// File the decoder was reading.
        path: PathBuf,
        /// Underlying cause.
        #[source]
        source: mezcla_io::Error,
    },

    /// A realtime submit did not fit the source queue.
    #[error("realtime queue overflow: {0}")]
    QueueOverflow(#[from] QueueFull),

    /// A non-clampable argument was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not legal in the current state (e.g. seeking an
    /// input source).
    #[error("illegal state: {0}")]
    IllegalState(String),
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
