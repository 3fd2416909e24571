//! # Call Lifecycle
//!
//! Every frame is a sequence of typed guards, each holding exactly the part of the socket
//! it is allowed to touch.
//!
//! ## Outgoing
//!
//! ```text
//! CallContext::begin_call ─► CallWriter ─► wait_for_return ─► Returned ─► return_read_channel
//!     (write lock taken)      send args     (write lock          recv results  (read ownership
//!                                            released; parked)                 handed back)
//! ```
//!
//! ## Incoming
//!
//! ```text
//! Handler::handle(Incoming) ─► complete_reading_args ─► Pending ─► return_from_call ─► ReplyWriter ─► finish ─► Replied
//!                 recv args     (read ownership                     (write lock          send results
//!                                handed back)                        taken)
//! ```
//!
//! While parked in `wait_for_return` the calling thread keeps servicing calls the peer
//! makes back into it, so a handler on the other side may call this thread again before
//! replying.
//!
//! Objects are sent as handles into the sender's own table. `recv_object` resolves a
//! handle this side issued earlier; a handle issued by the peer is read with `recv_handle`
//! and kept as an opaque number.

use std::any::Any;
use std::marker::PhantomData;
use std::os::fd::AsFd;
use std::os::fd::OwnedFd;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::MutexGuard;

use bridgewire::Handle;
use bridgewire::Method;
use bridgewire::Opcode;
use bridgewire::RETURN_OPCODE;
use bridgewire::Sink;
use bridgewire::Source;
use bridgewire::TaskId;
use bridgewire::ThreadIdentity;

use crate::channel::ReadHalf;
use crate::channel::WriteHalf;
use crate::channel::lock;
use crate::connection::Connection;
use crate::dispatch::Task;
use crate::dispatch::Worker;
use crate::error::Error;
use crate::fatal;
use crate::fatal::OrAbort;

/// Services incoming calls.
///
/// Runs on the worker thread dedicated to the calling identity, or on a local thread that
/// is itself waiting for a return from the peer. The only way to produce a [`Replied`] is
/// to finish a reply, so every call is answered.
pub trait Handler<M: Method>: Send + Sync + 'static {
    fn handle(&self, call: Incoming<'_, M>) -> Replied;
}

/// Proof that a reply frame was written.
#[must_use]
pub struct Replied {
    _sealed: (),
}

/// The identity of a local call stack.
///
/// Not `Send`: a context stands for the thread it was created on, and the peer routes
/// reentrant calls for this identity back to whichever thread is waiting on it.
pub struct CallContext<M: Method> {
    conn: Connection<M>,
    worker: Arc<Worker<M>>,
    _local: PhantomData<*const ()>,
}

impl<M: Method> CallContext<M> {
    pub(crate) fn new(conn: Connection<M>, worker: Arc<Worker<M>>) -> Self {
        Self { conn, worker, _local: PhantomData }
    }

    pub fn identity(&self) -> ThreadIdentity {
        self.worker.identity()
    }

    pub fn connection(&self) -> &Connection<M> {
        &self.conn
    }

    /// Takes the write lock and writes the call header.
    pub fn begin_call(&self, method: M) -> CallWriter<'_, M> {
        let mut writer = lock(&self.conn.shared().writer);
        writer.send_u8(Opcode::Call(method).encode());
        writer.send_identity(self.identity());
        tracing::debug!(conn = %self.conn.name(), identity = %self.identity(), ?method, "begin call");
        CallWriter { cx: self, method, writer: Some(writer) }
    }

    /// Runs incoming calls for this identity until the return for `awaiting` arrives.
    pub(crate) fn serve(&self, awaiting: Option<TaskId>) -> ReadHalf {
        loop {
            match self.worker.park() {
                Task::Call { method, reader } => self.invoke(method, reader),
                Task::Return { task, reader } => match awaiting {
                    Some(expected) if expected == task => return reader,
                    Some(expected) => fatal::abort(Error::ReturnMismatch { expected, received: task }),
                    None => fatal::abort(Error::UnexpectedReturn { identity: self.identity(), task }),
                },
            }
        }
    }

    fn invoke(&self, method: M, reader: ReadHalf) {
        tracing::debug!(conn = %self.conn.name(), identity = %self.identity(), ?method, "handling call");
        self.worker.record_served();
        let call = Incoming { cx: self, method, reader: Some(reader) };
        let handler = &self.conn.shared().handler;
        if panic::catch_unwind(AssertUnwindSafe(|| handler.handle(call))).is_err() {
            fatal::abort(Error::HandlerPanicked { method: format!("{:?}", method) });
        }
    }
}

/// Aborts for a guard dropped with its half of the socket still held.
fn abandoned<M: Method>(guard: &'static str, method: M) -> ! {
    if std::thread::panicking() {
        fatal::abort(Error::HandlerPanicked { method: format!("{:?}", method) });
    }
    fatal::abort(Error::AbandonedFrame(guard))
}

fn send_object<M: Method, T: Any + Send + Sync>(
    sink: &mut impl Sink,
    cx: &CallContext<M>,
    object: Option<Arc<T>>,
) -> Handle {
    let handle = cx.conn.handles().register_nullable(object);
    sink.send_handle(handle);
    handle
}

fn recv_object<M: Method, T: Any + Send + Sync>(source: &mut impl Source, cx: &CallContext<M>) -> Option<Arc<T>> {
    let handle = source.recv_handle();
    cx.conn.handles().lookup(handle)
}

/// An outgoing call frame under construction. Holds the write lock.
pub struct CallWriter<'a, M: Method> {
    cx: &'a CallContext<M>,
    method: M,
    writer: Option<MutexGuard<'a, WriteHalf>>,
}

impl<'a, M: Method> CallWriter<'a, M> {
    fn writer(&mut self) -> &mut WriteHalf {
        match self.writer.as_deref_mut() {
            Some(writer) => writer,
            None => abandoned("CallWriter", self.method),
        }
    }

    /// Registers `object` in the local handle table and sends its handle.
    pub fn send_object<T: Any + Send + Sync>(&mut self, object: Option<Arc<T>>) -> Handle {
        let cx = self.cx;
        send_object(self, cx, object)
    }

    /// Sends `fd` at this point in the frame.
    pub fn send_fd(&mut self, fd: impl AsFd) {
        self.writer().send_fd(fd.as_fd()).or_abort();
    }

    /// Finishes the frame, releases the write lock, and blocks until the reply arrives.
    pub fn wait_for_return(mut self) -> Returned<'a, M> {
        let cx = self.cx;
        let Some(mut writer) = self.writer.take() else {
            abandoned("CallWriter", self.method)
        };
        let task = cx.conn.shared().slots.allocate(cx.identity());
        writer.send_task(task);
        writer.flush().or_abort();
        drop(writer);

        tracing::trace!(conn = %cx.conn.name(), identity = %cx.identity(), %task, "waiting for return");
        let reader = cx.serve(Some(task));
        Returned { cx, task, reader: Some(reader) }
    }
}

impl<M: Method> Sink for CallWriter<'_, M> {
    fn send(&mut self, buf: &[u8]) {
        self.writer().send(buf);
    }
}

impl<M: Method> Drop for CallWriter<'_, M> {
    fn drop(&mut self) {
        if self.writer.is_some() {
            abandoned("CallWriter", self.method);
        }
    }
}

/// The results of an outgoing call. Holds read ownership until dropped.
pub struct Returned<'a, M: Method> {
    cx: &'a CallContext<M>,
    task: TaskId,
    reader: Option<ReadHalf>,
}

impl<M: Method> Returned<'_, M> {
    fn reader(&mut self) -> &mut ReadHalf {
        match self.reader.as_mut() {
            Some(reader) => reader,
            None => fatal::abort(Error::AbandonedFrame("Returned")),
        }
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Reads a handle and resolves it against the local handle table.
    pub fn recv_object<T: Any + Send + Sync>(&mut self) -> Option<Arc<T>> {
        let cx = self.cx;
        recv_object(self, cx)
    }

    pub fn recv_fd(&mut self) -> OwnedFd {
        self.reader().recv_fd().or_abort()
    }

    /// Hands read ownership back to the dispatcher and frees the wait slot.
    pub fn return_read_channel(self) {}
}

impl<M: Method> Source for Returned<'_, M> {
    fn recv(&mut self, buf: &mut [u8]) {
        self.reader().recv(buf);
    }
}

impl<M: Method> Drop for Returned<'_, M> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            // Unwinding mid-read leaves the rest of the results on the wire.
            if std::thread::panicking() {
                fatal::abort(Error::AbandonedFrame("Returned"));
            }
            self.cx.conn.shared().slots.release(self.task).or_abort();
            self.cx.conn.return_reader(reader);
            tracing::trace!(conn = %self.cx.conn.name(), task = %self.task, "return consumed");
        }
    }
}

/// An incoming call whose args are still on the wire. Holds read ownership.
pub struct Incoming<'a, M: Method> {
    cx: &'a CallContext<M>,
    method: M,
    reader: Option<ReadHalf>,
}

impl<'a, M: Method> Incoming<'a, M> {
    fn reader(&mut self) -> &mut ReadHalf {
        match self.reader.as_mut() {
            Some(reader) => reader,
            None => abandoned("Incoming", self.method),
        }
    }

    pub fn method(&self) -> M {
        self.method
    }

    /// The remote identity this call belongs to.
    pub fn caller(&self) -> ThreadIdentity {
        self.cx.identity()
    }

    /// Reads a handle and resolves it against the local handle table.
    pub fn recv_object<T: Any + Send + Sync>(&mut self) -> Option<Arc<T>> {
        let cx = self.cx;
        recv_object(self, cx)
    }

    pub fn recv_fd(&mut self) -> OwnedFd {
        self.reader().recv_fd().or_abort()
    }

    /// Reads the trailing task id and hands read ownership back to the dispatcher.
    ///
    /// Must come after the last arg is read and before any outgoing call is made.
    pub fn complete_reading_args(mut self) -> Pending<'a, M> {
        let task = self.recv_task();
        if let Some(reader) = self.reader.take() {
            self.cx.conn.return_reader(reader);
        }
        Pending { cx: self.cx, method: self.method, task }
    }
}

impl<M: Method> Source for Incoming<'_, M> {
    fn recv(&mut self, buf: &mut [u8]) {
        self.reader().recv(buf);
    }
}

impl<M: Method> Drop for Incoming<'_, M> {
    fn drop(&mut self) {
        if self.reader.is_some() {
            abandoned("Incoming", self.method);
        }
    }
}

/// An incoming call whose args have been read and whose reply is owed.
pub struct Pending<'a, M: Method> {
    cx: &'a CallContext<M>,
    method: M,
    task: TaskId,
}

impl<'a, M: Method> Pending<'a, M> {
    pub fn method(&self) -> M {
        self.method
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    /// The call stack this handler runs on. Calls made through it may be serviced by the
    /// very thread that is waiting on this handler.
    pub fn context(&self) -> &'a CallContext<M> {
        self.cx
    }

    /// Takes the write lock and writes the return header.
    pub fn return_from_call(self) -> ReplyWriter<'a, M> {
        let cx = self.cx;
        let mut writer = lock(&cx.conn.shared().writer);
        writer.send_u8(RETURN_OPCODE);
        writer.send_task(self.task);
        ReplyWriter { cx, method: self.method, task: self.task, writer: Some(writer) }
    }
}

/// A reply frame under construction. Holds the write lock.
pub struct ReplyWriter<'a, M: Method> {
    cx: &'a CallContext<M>,
    method: M,
    task: TaskId,
    writer: Option<MutexGuard<'a, WriteHalf>>,
}

impl<M: Method> ReplyWriter<'_, M> {
    fn writer(&mut self) -> &mut WriteHalf {
        match self.writer.as_deref_mut() {
            Some(writer) => writer,
            None => abandoned("ReplyWriter", self.method),
        }
    }

    /// Registers `object` in the local handle table and sends its handle.
    pub fn send_object<T: Any + Send + Sync>(&mut self, object: Option<Arc<T>>) -> Handle {
        let cx = self.cx;
        send_object(self, cx, object)
    }

    pub fn send_fd(&mut self, fd: impl AsFd) {
        self.writer().send_fd(fd.as_fd()).or_abort();
    }

    /// Flushes the reply and releases the write lock.
    pub fn finish(mut self) -> Replied {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().or_abort();
        }
        tracing::debug!(conn = %self.cx.conn.name(), method = ?self.method, task = %self.task, "replied");
        Replied { _sealed: () }
    }
}

impl<M: Method> Sink for ReplyWriter<'_, M> {
    fn send(&mut self, buf: &[u8]) {
        self.writer().send(buf);
    }
}

impl<M: Method> Drop for ReplyWriter<'_, M> {
    fn drop(&mut self) {
        if self.writer.is_some() {
            abandoned("ReplyWriter", self.method);
        }
    }
}
