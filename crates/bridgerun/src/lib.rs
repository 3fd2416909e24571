//! # Bridgerun
//!
//! A synchronous, reentrant call transport between two processes joined by one Unix
//! stream socket. Either side may call the other at any time, and a handler may call back
//! into its caller before replying, to any depth.
//!
//! ## Architecture
//!
//! - **Connection**: Owns the socket, the wait slots, the handle table, and the worker
//!   registry. Cheap to clone.
//! - **Dispatcher**: One thread per connection that reads frame headers and routes each
//!   frame to the worker that must service it.
//! - **Workers**: One record per logical thread. Calls from a remote identity always run
//!   on the same local OS thread, so thread-affine peers (GPU contexts, driver state) keep
//!   their affinity across the bridge.
//! - **CallContext**: The explicit identity of a local call stack. Obtained with
//!   [`Connection::attach`] on threads the transport did not spawn, or from
//!   [`Pending::context`] inside a handler.
//!
//! ## Invariants
//!
//! - **One Reader, One Writer**: Exactly one thread reads the socket at a time and exactly
//!   one writes. Read ownership is a value ([`Incoming`], [`Returned`]) that is handed back
//!   explicitly; write ownership is a guard held by [`CallWriter`] and [`ReplyWriter`].
//! - **Fail Stop**: Any I/O error or framing violation aborts the process. There is no
//!   resynchronization.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bridgerun::{Connection, Handler, Incoming, Replied};
//! use bridgewire::{Sink, Source};
//!
//! bridgewire::define_methods! {
//!     pub enum Calc { Add = 0 }
//! }
//!
//! struct Adder;
//!
//! impl Handler<Calc> for Adder {
//!     fn handle(&self, mut call: Incoming<'_, Calc>) -> Replied {
//!         let (a, b) = (call.recv_u64(), call.recv_u64());
//!         let mut reply = call.complete_reading_args().return_from_call();
//!         reply.send_u64(a + b);
//!         reply.finish()
//!     }
//! }
//!
//! # fn main() -> bridgerun::Result<()> {
//! let conn = Connection::builder(Adder).name("host").connect("/tmp/vrlink/sock")?;
//! let cx = conn.attach();
//! let mut call = cx.begin_call(Calc::Add);
//! call.send_u64(2);
//! call.send_u64(3);
//! let mut ret = call.wait_for_return();
//! assert_eq!(ret.recv_u64(), 5);
//! ret.return_read_channel();
//! # Ok(())
//! # }
//! ```

mod call;
mod channel;
mod connection;
mod dispatch;
mod error;
pub mod fatal;
mod fdpass;
mod handles;
mod slots;

pub use call::CallContext;
pub use call::CallWriter;
pub use call::Handler;
pub use call::Incoming;
pub use call::Pending;
pub use call::Replied;
pub use call::ReplyWriter;
pub use call::Returned;
pub use connection::Connection;
pub use connection::ConnectionBuilder;
pub use error::Error;
pub use error::Result;
pub use handles::HandleTable;

#[cfg(test)]
mod tests;
