//! # Socket Halves
//!
//! The connection socket is cloned into a read half and a write half that are owned and
//! locked independently.
//!
//! ## Invariants
//! - **Unbuffered Reads**: The read half never reads ahead. Bytes past the current frame
//!   may belong to the next owner of the read half, and ancillary data (descriptors) is
//!   only delivered alongside the byte it was sent with.
//! - **Flushed Writes**: The write half buffers within a frame and is flushed before the
//!   write lock is released and before any descriptor is sent.
//! - **Handoff by Value**: Read ownership is the [`ReadHalf`] value itself. Whoever holds
//!   it may read; it changes hands through a [`Baton`].

use std::io::BufWriter;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::os::fd::AsFd;
use std::os::fd::BorrowedFd;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use bridgewire::Sink;
use bridgewire::Source;

use crate::error::Result;
use crate::fatal::OrAbort;
use crate::fdpass;

/// Locks `mutex`, ignoring poison. A panic while holding transport state aborts the
/// process anyway.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Waits on `condvar`, ignoring poison.
pub(crate) fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

/// The writing end of the socket.
pub(crate) struct WriteHalf {
    stream: BufWriter<UnixStream>,
}

impl WriteHalf {
    pub fn new(stream: UnixStream) -> Self {
        Self { stream: BufWriter::new(stream) }
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }

    /// Sends `fd` in band, after everything written so far.
    pub fn send_fd(&mut self, fd: BorrowedFd<'_>) -> Result<()> {
        self.flush()?;
        fdpass::send_fd(self.stream.get_ref().as_fd(), fd)
    }
}

impl Sink for WriteHalf {
    fn send(&mut self, buf: &[u8]) {
        self.write(buf).or_abort();
    }
}

/// The reading end of the socket.
pub(crate) struct ReadHalf {
    stream: UnixStream,
}

impl ReadHalf {
    pub fn new(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Fills `buf` completely. End of stream here is a truncated frame.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream.read_exact(buf)?;
        Ok(())
    }

    /// Reads the opcode byte that opens a frame.
    ///
    /// Returns `None` when the peer closed the stream on a frame boundary, which is the
    /// only orderly way for a connection to end.
    pub fn recv_header(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::ConnectionReset => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn recv_fd(&mut self) -> Result<OwnedFd> {
        fdpass::recv_fd(self.stream.as_fd())
    }
}

impl Source for ReadHalf {
    fn recv(&mut self, buf: &mut [u8]) {
        self.read(buf).or_abort();
    }
}

/// A value passed between threads, held by at most one of them at a time.
pub(crate) struct Baton<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Baton<T> {
    pub fn new(value: T) -> Self {
        Self { slot: Mutex::new(Some(value)), ready: Condvar::new() }
    }

    /// Blocks until the value is available and takes it.
    pub fn take(&self) -> T {
        let mut slot = lock(&self.slot);
        loop {
            if let Some(value) = slot.take() {
                return value;
            }
            slot = wait(&self.ready, slot);
        }
    }

    /// Hands the value back. Returns it if the baton was already full.
    pub fn put(&self, value: T) -> std::result::Result<(), T> {
        let mut slot = lock(&self.slot);
        if slot.is_some() {
            return Err(value);
        }
        *slot = Some(value);
        self.ready.notify_one();
        Ok(())
    }

    #[cfg(test)]
    pub fn is_held(&self) -> bool {
        lock(&self.slot).is_none()
    }
}
