use thiserror::Error;

/// Unified error type for the session manager core.
///
/// Lookup misses are not errors; APIs return `Option` for those.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input to an API call; the call fails with no state change.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// File read/write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hook ordering constraints form a cycle; the named hooks are skipped.
    #[error("hook ordering cycle involving: {}", .0.join(", "))]
    Cycle(Vec<String>),

    /// A required external service (request bus, media server) is down.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A hook executor reported failure.
    #[error("hook failed: {0}")]
    Hook(String),
}
