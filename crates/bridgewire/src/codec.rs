//! # Fixed-Layout Primitives
//!
//! Callers pack and unpack their own argument lists field by field. These traits supply
//! the little-endian building blocks; the transport supplies the byte pipe.
//!
//! ## Invariants
//! - **Infallible by Contract**: `send`/`recv` either move every byte or end the process.
//!   A short read cannot be resumed because the stream has no framing to realign on.
//! - **Symmetry**: Every `send_*` has a `recv_*` that consumes exactly the same bytes.

use crate::ids::Handle;
use crate::ids::TaskId;
use crate::ids::ThreadIdentity;

/// Generates `send_*` helpers for types with `to_le_bytes`.
macro_rules! sink_scalar {
    ($name:ident, $ty:ty) => {
        #[inline]
        fn $name(&mut self, v: $ty) {
            self.send(&v.to_le_bytes());
        }
    };
}

/// Generates `recv_*` helpers for types with `from_le_bytes`.
macro_rules! source_scalar {
    ($name:ident, $ty:ty) => {
        #[inline]
        fn $name(&mut self) -> $ty {
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            self.recv(&mut buf);
            <$ty>::from_le_bytes(buf)
        }
    };
}

/// The writing half of a frame.
pub trait Sink {
    /// Writes every byte of `buf`.
    fn send(&mut self, buf: &[u8]);

    sink_scalar!(send_u8, u8);
    sink_scalar!(send_u16, u16);
    sink_scalar!(send_u32, u32);
    sink_scalar!(send_u64, u64);
    sink_scalar!(send_i32, i32);
    sink_scalar!(send_i64, i64);
    sink_scalar!(send_f32, f32);
    sink_scalar!(send_f64, f64);

    fn send_bool(&mut self, v: bool) {
        self.send_u8(v as u8);
    }

    fn send_identity(&mut self, id: ThreadIdentity) {
        self.send_u64(id.0);
    }

    fn send_task(&mut self, task: TaskId) {
        self.send_u64(task.0);
    }

    fn send_handle(&mut self, handle: Handle) {
        self.send_u64(handle.0);
    }

    /// `[Len: u64][Data: Len]`
    fn send_blob(&mut self, data: &[u8]) {
        self.send_u64(data.len() as u64);
        self.send(data);
    }

    fn send_str(&mut self, s: &str) {
        self.send_blob(s.as_bytes());
    }
}

/// The reading half of a frame.
pub trait Source {
    /// Fills every byte of `buf`.
    fn recv(&mut self, buf: &mut [u8]);

    source_scalar!(recv_u8, u8);
    source_scalar!(recv_u16, u16);
    source_scalar!(recv_u32, u32);
    source_scalar!(recv_u64, u64);
    source_scalar!(recv_i32, i32);
    source_scalar!(recv_i64, i64);
    source_scalar!(recv_f32, f32);
    source_scalar!(recv_f64, f64);

    /// Any non-zero byte reads as `true`.
    fn recv_bool(&mut self) -> bool {
        self.recv_u8() != 0
    }

    fn recv_identity(&mut self) -> ThreadIdentity {
        ThreadIdentity(self.recv_u64())
    }

    fn recv_task(&mut self) -> TaskId {
        TaskId(self.recv_u64())
    }

    fn recv_handle(&mut self) -> Handle {
        Handle(self.recv_u64())
    }

    fn recv_blob(&mut self) -> Vec<u8> {
        let len = self.recv_u64() as usize;
        let mut data = vec![0u8; len];
        self.recv(&mut data);
        data
    }

    /// Payloads are not validated; invalid UTF-8 is replaced rather than rejected.
    fn recv_string(&mut self) -> String {
        String::from_utf8_lossy(&self.recv_blob()).into_owned()
    }
}

impl Sink for Vec<u8> {
    fn send(&mut self, buf: &[u8]) {
        self.extend_from_slice(buf);
    }
}
