//! Error types for PSI sessions, the correlation channel, and storage.

use thiserror::Error;

use overlap_grid::GridError;

#[derive(Error, Debug)]
pub enum PsiError {
    /// No response arrived within the caller's deadline.
    #[error("Engine call timed out after {0:?}")]
    ChannelTimeout(std::time::Duration),

    /// ComputeIntersection was requested for a context id the store does not hold.
    /// Distinct from a computed, empty intersection.
    #[error("No stored session for context '{0}'")]
    MissingSession(String),

    /// An inbound message failed to parse or carried an unmatched id.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The engine reported an error for a well-formed call.
    #[error("Engine fault: {0}")]
    EngineFault(String),

    /// A call was issued before the engine announced readiness.
    #[error("Engine is not ready")]
    NotReady,

    /// The channel was torn down while the call was pending.
    #[error("Channel closed")]
    ChannelClosed,

    #[error("Correlation id '{0}' is already pending")]
    DuplicateCorrelationId(String),

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Calendar error: {0}")]
    Calendar(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PsiError>;
