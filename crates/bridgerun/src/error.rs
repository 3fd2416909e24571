//! # Error Definitions
//!
//! Bootstrap failures are returned to the caller. Everything that happens after the
//! connection is up is routed through [`fatal::abort`](crate::fatal::abort) instead; the
//! variants below still name the reason so the log says why the process died.

use std::path::PathBuf;

use bridgewire::Handle;
use bridgewire::TaskId;
use bridgewire::ThreadIdentity;

/// Transport failures.
#[derive(Debug)]
pub enum Error {
    /// A socket read or write failed.
    Io(std::io::Error),
    /// The listening socket could not be created.
    Bind { path: PathBuf, source: std::io::Error },
    /// The rendezvous path could not be reached.
    Connect { path: PathBuf, source: std::io::Error },
    /// Accepting the single peer failed.
    Accept(std::io::Error),
    /// A header byte did not decode.
    Wire(bridgewire::Error),
    /// The stream ended in the middle of a frame.
    Truncated,
    /// A return frame named a task with no outstanding call.
    UnknownTask(TaskId),
    /// A frame named a locally minted identity that was never attached.
    UnknownWorker(ThreadIdentity),
    /// A task was routed to a worker that already had one queued.
    WorkerBusy(ThreadIdentity),
    /// A return arrived on a worker that was not waiting for one.
    UnexpectedReturn { identity: ThreadIdentity, task: TaskId },
    /// A return arrived for a different call than the one being awaited.
    ReturnMismatch { expected: TaskId, received: TaskId },
    /// A handle pointed past the end of the object table.
    HandleOutOfRange { handle: Handle, len: usize },
    /// A handle resolved to an object of another type.
    HandleType { handle: Handle, expected: &'static str },
    /// Descriptor passing did not move exactly one descriptor.
    Descriptor(String),
    /// A handler unwound instead of replying.
    HandlerPanicked { method: String },
    /// A frame was dropped half-written or half-read.
    AbandonedFrame(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Bind { path, source } => write!(f, "Cannot listen on {}: {}", path.display(), source),
            Error::Connect { path, source } => write!(f, "Cannot connect to {}: {}", path.display(), source),
            Error::Accept(e) => write!(f, "Accept failed: {}", e),
            Error::Wire(e) => write!(f, "Wire error: {}", e),
            Error::Truncated => write!(f, "Stream ended mid-frame"),
            Error::UnknownTask(task) => write!(f, "Return for unknown {}", task),
            Error::UnknownWorker(id) => write!(f, "Frame names unattached local identity {}", id),
            Error::WorkerBusy(id) => write!(f, "Worker {} already has a queued task", id),
            Error::UnexpectedReturn { identity, task } => {
                write!(f, "Worker {} received return for {} while not waiting", identity, task)
            }
            Error::ReturnMismatch { expected, received } => {
                write!(f, "Expected return for {}, received {}", expected, received)
            }
            Error::HandleOutOfRange { handle, len } => {
                write!(f, "{} is out of range (table holds {})", handle, len)
            }
            Error::HandleType { handle, expected } => write!(f, "{} is not a {}", handle, expected),
            Error::Descriptor(msg) => write!(f, "Descriptor passing failed: {}", msg),
            Error::HandlerPanicked { method } => write!(f, "Handler for {} panicked", method),
            Error::AbandonedFrame(what) => write!(f, "{} dropped before the frame was complete", what),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) | Error::Accept(e) => Some(e),
            Error::Bind { source, .. } | Error::Connect { source, .. } => Some(source),
            Error::Wire(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Error::Truncated;
        }
        Error::Io(e)
    }
}

impl From<bridgewire::Error> for Error {
    fn from(e: bridgewire::Error) -> Self {
        Error::Wire(e)
    }
}

impl From<nix::errno::Errno> for Error {
    fn from(e: nix::errno::Errno) -> Self {
        Error::Io(std::io::Error::from(e))
    }
}

/// Specialized `Result` for transport operations.
pub type Result<T> = std::result::Result<T, Error>;
