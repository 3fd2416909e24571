//! # Connection
//!
//! Bootstrap and shared state for one bridge. A connection is created once per process
//! pair, either from a socket already in hand or by meeting at a filesystem path.
//!
//! ## Roles
//! - **Primary**: The side that listens. Creates the rendezvous directory, removes a stale
//!   socket file, binds, and accepts exactly one peer.
//! - **Secondary**: The side that connects.
//!
//! The roles only differ during bootstrap and in the high bit of the identities each side
//! mints. After that the protocol is symmetric.

use std::net::Shutdown;
use std::os::unix::net::UnixListener;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use bridgewire::Method;
use bridgewire::Side;
use bridgewire::ThreadIdentity;
use dashmap::DashMap;

use crate::call::CallContext;
use crate::call::Handler;
use crate::channel::Baton;
use crate::channel::ReadHalf;
use crate::channel::WriteHalf;
use crate::channel::lock;
use crate::channel::wait;
use crate::dispatch;
use crate::dispatch::Worker;
use crate::error::Error;
use crate::error::Result;
use crate::fatal;
use crate::handles::HandleTable;
use crate::slots::WaitSlots;

pub(crate) struct Shared<M: Method> {
    pub name: String,
    pub side: Side,
    pub writer: Mutex<WriteHalf>,
    pub reader: Baton<ReadHalf>,
    pub slots: WaitSlots,
    pub handles: HandleTable,
    pub workers: DashMap<ThreadIdentity, Arc<Worker<M>>>,
    pub handler: Box<dyn Handler<M>>,
    control: UnixStream,
    next_serial: AtomicU64,
    closed: Mutex<bool>,
    closed_signal: Condvar,
}

/// One end of a bridge.
pub struct Connection<M: Method> {
    shared: Arc<Shared<M>>,
}

impl<M: Method> Clone for Connection<M> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<M: Method> Connection<M> {
    /// Starts configuring a connection whose incoming calls go to `handler`.
    pub fn builder(handler: impl Handler<M>) -> ConnectionBuilder<M> {
        ConnectionBuilder { handler: Box::new(handler), name: "bridge".into(), side: Side::Primary }
    }

    /// Connects two in-process ends over a socket pair.
    pub fn pair(primary: impl Handler<M>, secondary: impl Handler<M>) -> Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        let primary = Self::builder(primary).name("primary").side(Side::Primary).from_stream(a)?;
        let secondary = Self::builder(secondary).name("secondary").side(Side::Secondary).from_stream(b)?;
        Ok((primary, secondary))
    }

    pub(crate) fn shared(&self) -> &Shared<M> {
        &self.shared
    }

    /// Hands read ownership back to the dispatcher.
    pub(crate) fn return_reader(&self, reader: ReadHalf) {
        if self.shared.reader.put(reader).is_err() {
            fatal::abort(Error::AbandonedFrame("read ownership returned twice"));
        }
    }

    pub(crate) fn mark_closed(&self) {
        *lock(&self.shared.closed) = true;
        self.shared.closed_signal.notify_all();
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn side(&self) -> Side {
        self.shared.side
    }

    /// Mints a fresh identity for the calling thread.
    ///
    /// Each context is a separate logical thread to the peer. Keep one per OS thread and
    /// reuse it; contexts are never reclaimed.
    pub fn attach(&self) -> CallContext<M> {
        let serial = self.shared.next_serial.fetch_add(1, Ordering::Relaxed);
        let identity = ThreadIdentity::new(self.shared.side, serial);
        let worker = Arc::new(Worker::new(identity, false));
        self.shared.workers.insert(identity, Arc::clone(&worker));
        tracing::debug!(conn = %self.shared.name, %identity, "attached local thread");
        CallContext::new(self.clone(), worker)
    }

    /// The objects this side has exposed to the peer.
    pub fn handles(&self) -> &HandleTable {
        &self.shared.handles
    }

    /// Worker threads spawned for peer identities.
    pub fn worker_count(&self) -> usize {
        self.shared.workers.iter().filter(|w| w.value().is_remote()).count()
    }

    /// Calls serviced on the worker for `identity`, if it exists.
    pub fn calls_served(&self, identity: ThreadIdentity) -> Option<u64> {
        self.shared.workers.get(&identity).map(|w| w.value().served())
    }

    /// Outgoing calls that have not yet been consumed.
    pub fn outstanding_calls(&self) -> usize {
        self.shared.slots.outstanding()
    }

    /// Shuts the socket down in both directions. The peer's dispatcher sees end of stream.
    pub fn shutdown(&self) -> Result<()> {
        self.shared.control.shutdown(Shutdown::Both)?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        *lock(&self.shared.closed)
    }

    /// Blocks until the peer has closed the connection.
    pub fn wait_closed(&self) {
        let mut closed = lock(&self.shared.closed);
        while !*closed {
            closed = wait(&self.shared.closed_signal, closed);
        }
    }
}

/// Configures and establishes a [`Connection`].
pub struct ConnectionBuilder<M: Method> {
    handler: Box<dyn Handler<M>>,
    name: String,
    side: Side,
}

impl<M: Method> ConnectionBuilder<M> {
    /// Label used in logs and thread names.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Which identity space this end mints from. `listen` and `connect` set it for you.
    pub fn side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    /// Takes over a connected stream and starts the dispatcher.
    pub fn from_stream(self, stream: UnixStream) -> Result<Connection<M>> {
        let reader = ReadHalf::new(stream.try_clone()?);
        let writer = WriteHalf::new(stream.try_clone()?);
        let shared = Shared {
            name: self.name,
            side: self.side,
            writer: Mutex::new(writer),
            reader: Baton::new(reader),
            slots: WaitSlots::new(),
            handles: HandleTable::new(),
            workers: DashMap::new(),
            handler: self.handler,
            control: stream,
            next_serial: AtomicU64::new(0),
            closed: Mutex::new(false),
            closed_signal: Condvar::new(),
        };
        let conn = Connection { shared: Arc::new(shared) };
        dispatch::start(conn.clone())?;
        tracing::info!(conn = %conn.name(), side = ?conn.side(), "connection established");
        Ok(conn)
    }

    /// Listens at `path` as the primary side and accepts one peer.
    pub fn listen(self, path: impl AsRef<Path>) -> Result<Connection<M>> {
        let path = path.as_ref();
        let bind_error = |source: std::io::Error| Error::Bind { path: path.to_path_buf(), source };

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(bind_error)?;
        }
        if std::fs::symlink_metadata(path).is_ok() {
            std::fs::remove_file(path).map_err(bind_error)?;
        }
        let listener = UnixListener::bind(path).map_err(bind_error)?;
        tracing::info!(conn = %self.name, path = %path.display(), "listening");

        let (stream, _) = listener.accept().map_err(Error::Accept)?;
        self.side(Side::Primary).from_stream(stream)
    }

    /// Connects to a primary listening at `path`.
    pub fn connect(self, path: impl AsRef<Path>) -> Result<Connection<M>> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .map_err(|source| Error::Connect { path: path.to_path_buf(), source })?;
        self.side(Side::Secondary).from_stream(stream)
    }
}
