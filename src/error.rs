//! Crate-wide error taxonomy.

use thiserror::Error;

/// Errors produced anywhere in the reactor, connection, parser, or pool stack.
#[derive(Debug, Error)]
pub enum RaskError {
    /// A non-blocking operation would block; the caller should retry on the next
    /// readiness notification. Not fatal.
    #[error("operation would block")]
    IoAgain,

    /// An unrecoverable I/O condition (peer reset, broken pipe, etc). The connection
    /// owning the fd must be closed.
    #[error("fatal I/O error: {0}")]
    IoFatal(#[source] std::io::Error),

    /// The request line, a header line, or the body could not be parsed.
    #[error("malformed request: {0}")]
    ParseInvalid(String),

    /// The resolved path is on the whitelist but the backing file does not exist.
    #[error("resource missing: {0}")]
    ResourceMissing(String),

    /// The resolved path exists but is not a readable regular file.
    #[error("resource forbidden: {0}")]
    ResourceForbidden(String),

    /// A connection's idle timer expired; treated identically to a close request.
    #[error("connection timer expired")]
    TimerExpired,

    /// The SQL connection pool has no available connections and the caller chose
    /// not to block (or the pool has been shut down).
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// The (bounded) log queue has been closed; further pushes are no-ops.
    #[error("log queue closed")]
    LogQueueClosed,

    /// The reactor's worker pool has shut down; its task channel no longer
    /// accepts submissions.
    #[error("worker pool closed")]
    WorkerPoolClosed,

    /// A timer operation referenced an id that isn't present.
    #[error("no such timer id")]
    UnknownTimerId,

    /// Wraps any other I/O error that doesn't fit the taxonomy above but still needs
    /// `?`-propagation at a boundary (e.g. binding the listening socket).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wraps the underlying SQL engine's error type.
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

impl RaskError {
    /// True if this error represents a transient, retry-on-next-readiness condition.
    pub fn is_again(&self) -> bool {
        matches!(self, RaskError::IoAgain)
    }

    /// Classifies a raw `io::Error` coming out of a non-blocking syscall into the
    /// `IoAgain` / `IoFatal` split required by the read/write loops.
    pub fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock => RaskError::IoAgain,
            _ => RaskError::IoFatal(err),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RaskError>;
