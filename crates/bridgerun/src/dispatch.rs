//! # Dispatcher and Workers
//!
//! The dispatcher is the only code that reads a frame header. It routes each frame to a
//! worker mailbox along with read ownership, then waits for read ownership to come back.
//!
//! - **Call**: `[Opcode][Identity]` routes to the worker for that identity. Remote
//!   identities get a dedicated OS thread on first sight; local identities are callers
//!   already parked in [`CallContext::serve`] waiting for this reentrant call.
//! - **Return**: `[0xFF][Task]` routes to whichever worker owns the task's wait slot.
//!
//! ## Invariants
//! - **Stable Affinity**: A remote identity maps to one worker for the life of the
//!   connection. Records are never removed.
//! - **One Task Per Mailbox**: A logical thread is a single stack, so it can never have two
//!   frames waiting for it. A second delivery is a protocol violation.

use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;

use bridgewire::Method;
use bridgewire::Opcode;
use bridgewire::Source;
use bridgewire::TaskId;
use bridgewire::ThreadIdentity;

use crate::call::CallContext;
use crate::channel::ReadHalf;
use crate::channel::lock;
use crate::channel::wait;
use crate::connection::Connection;
use crate::error::Error;
use crate::error::Result;
use crate::fatal;
use crate::fatal::OrAbort;

/// A frame handed to a worker together with read ownership.
pub(crate) enum Task<M> {
    /// Args follow in the stream.
    Call { method: M, reader: ReadHalf },
    /// Results follow in the stream.
    Return { task: TaskId, reader: ReadHalf },
}

/// The mailbox of one logical thread.
pub(crate) struct Worker<M> {
    identity: ThreadIdentity,
    remote: bool,
    mailbox: Mutex<Option<Task<M>>>,
    wake: Condvar,
    served: AtomicU64,
}

impl<M> Worker<M> {
    pub fn new(identity: ThreadIdentity, remote: bool) -> Self {
        Self { identity, remote, mailbox: Mutex::new(None), wake: Condvar::new(), served: AtomicU64::new(0) }
    }

    pub fn identity(&self) -> ThreadIdentity {
        self.identity
    }

    /// Whether the record was created for a peer identity (and owns a spawned thread).
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Queues `task` and wakes the owning thread.
    pub fn deliver(&self, task: Task<M>) -> Result<()> {
        let mut mailbox = lock(&self.mailbox);
        if mailbox.is_some() {
            return Err(Error::WorkerBusy(self.identity));
        }
        *mailbox = Some(task);
        self.wake.notify_all();
        Ok(())
    }

    /// Blocks the calling thread until a task arrives.
    pub fn park(&self) -> Task<M> {
        let mut mailbox = lock(&self.mailbox);
        loop {
            if let Some(task) = mailbox.take() {
                return task;
            }
            mailbox = wait(&self.wake, mailbox);
        }
    }

    pub fn record_served(&self) {
        self.served.fetch_add(1, Ordering::Relaxed);
    }

    /// Calls this worker has run to completion or started.
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }
}

/// Starts the dispatcher thread for `conn`.
pub(crate) fn start<M: Method>(conn: Connection<M>) -> Result<()> {
    let name = format!("{}-dispatch", conn.name());
    thread::Builder::new().name(name).spawn(move || run(conn))?;
    Ok(())
}

fn run<M: Method>(conn: Connection<M>) {
    let shared = conn.shared();
    loop {
        let mut reader = shared.reader.take();
        let Some(byte) = reader.recv_header().or_abort() else {
            let outstanding = shared.slots.outstanding();
            if outstanding > 0 {
                fatal::abort(Error::Truncated);
            }
            tracing::info!(conn = %shared.name, "peer closed the connection");
            conn.mark_closed();
            return;
        };

        match Opcode::<M>::decode(byte).map_err(Error::from).or_abort() {
            Opcode::Call(method) => {
                let identity = reader.recv_identity();
                let worker = worker_for(&conn, identity);
                tracing::trace!(conn = %shared.name, %identity, ?method, "routing call");
                worker.deliver(Task::Call { method, reader }).or_abort();
            }
            Opcode::Return => {
                let task = reader.recv_task();
                let owner = shared.slots.trigger(task).or_abort();
                let worker = shared
                    .workers
                    .get(&owner)
                    .map(|w| Arc::clone(w.value()))
                    .unwrap_or_else(|| fatal::abort(Error::UnknownWorker(owner)));
                tracing::trace!(conn = %shared.name, %task, identity = %owner, "routing return");
                worker.deliver(Task::Return { task, reader }).or_abort();
            }
        }
    }
}

/// Finds the worker for `identity`, spawning one for a first-seen peer identity.
fn worker_for<M: Method>(conn: &Connection<M>, identity: ThreadIdentity) -> Arc<Worker<M>> {
    let shared = conn.shared();
    if let Some(worker) = shared.workers.get(&identity) {
        return Arc::clone(worker.value());
    }
    // Local identities are only ever created by `attach`.
    if identity.side() == shared.side {
        fatal::abort(Error::UnknownWorker(identity));
    }
    let worker = spawn(conn, identity).or_abort();
    shared.workers.insert(identity, Arc::clone(&worker));
    worker
}

fn spawn<M: Method>(conn: &Connection<M>, identity: ThreadIdentity) -> Result<Arc<Worker<M>>> {
    let worker = Arc::new(Worker::new(identity, true));
    let thread_conn = conn.clone();
    let thread_worker = Arc::clone(&worker);
    let name = format!("{}-worker-{}", conn.name(), identity);

    thread::Builder::new().name(name).spawn(move || {
        tracing::debug!(conn = %thread_conn.name(), %identity, "worker started");
        let cx = CallContext::new(thread_conn, thread_worker);
        // A root loop awaits nothing, so `serve` only comes back by aborting.
        let _ = cx.serve(None);
    })?;
    Ok(worker)
}
