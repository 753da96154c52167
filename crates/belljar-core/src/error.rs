//! Error types for the Belljar host orchestrator.
//!
//! Every failure is local to one `create`/`run`/`dispose` call; nothing in
//! this taxonomy is fatal to the host application. The disposal error is a
//! distinguished variant so callers can branch on "the sandbox is gone"
//! versus "the code failed".

use thiserror::Error;

use belljar_bridge::channel::ChannelError;
use belljar_bridge::protocol::FaultKind;

/// Failures surfaced by a sandbox session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The isolation container or guest context failed to initialize.
    /// Surfaced only by session creation.
    #[error("sandbox construction failed: {0}")]
    Construction(String),

    /// The submitted code is not syntactically valid as an
    /// implicitly-asynchronous function body. The session remains usable.
    #[error("script compilation failed: {0}")]
    Compile(String),

    /// The code threw, a suspension rejected, or its result could not cross
    /// the boundary. The session remains usable; global state mutated
    /// before the failure point persists.
    #[error("script execution failed: {0}")]
    Runtime(String),

    /// The session was disposed, either before this call or while it was
    /// pending.
    #[error("session disposed")]
    Disposed,

    /// The bridge itself misbehaved; not attributable to submitted code.
    #[error("bridge failure: {0}")]
    Bridge(String),
}

impl SessionError {
    /// Check whether this is the disposal error.
    pub fn is_disposed(&self) -> bool {
        matches!(self, SessionError::Disposed)
    }

    /// Map a channel-level run failure onto the session taxonomy.
    pub(crate) fn from_run_error(error: ChannelError) -> Self {
        match error {
            // The channel only closes at disposal.
            ChannelError::Closed => SessionError::Disposed,
            ChannelError::Fault(fault) => match fault.kind {
                FaultKind::Compile => SessionError::Compile(fault.message),
                FaultKind::Runtime => SessionError::Runtime(fault.message),
                FaultKind::Internal => SessionError::Bridge(fault.message),
            },
            ChannelError::Codec(err) => SessionError::Bridge(err.to_string()),
        }
    }
}

/// Result type alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;
