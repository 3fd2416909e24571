//! Fail-stop termination.
//!
//! Once a connection is up, the byte stream is the only source of truth about frame
//! boundaries. A failed read or write leaves it at an unknown offset, so the process ends
//! here and the peer observes the closed socket on its next operation.

use crate::error::Error;
use crate::error::Result;

/// Logs `err` and aborts the process.
pub fn abort(err: Error) -> ! {
    tracing::error!(error = %err, "fatal transport error, aborting");
    eprintln!("bridgerun: fatal: {}", err);
    std::process::abort()
}

/// Unwraps a transport result or aborts.
pub(crate) trait OrAbort<T> {
    fn or_abort(self) -> T;
}

impl<T> OrAbort<T> for Result<T> {
    fn or_abort(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => abort(e),
        }
    }
}
