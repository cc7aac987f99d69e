//! Adapter-level error kinds.
//!
//! One flat `thiserror` enum with transparent wrapping for I/O, matching
//! the DAP adapter's own error taxonomy.

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Malformed frame, bad JSON, unknown command, missing required field.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// End of stream while reading a frame header or body.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The target script failed to load (not found, or compile failure).
    #[error("failed to load debuggee: {0}")]
    DebuggeeLoad(String),

    /// The target script raised an uncaught error while running.
    #[error("debuggee runtime error: {0}")]
    DebuggeeRuntime(String),

    /// A request referenced state that no longer exists (e.g. a stale
    /// frame id). Reported as an empty result, not propagated as a hard
    /// failure, but still useful to have a typed variant for logging.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
