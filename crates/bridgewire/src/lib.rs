//! # Bridgewire
//!
//! The fixed, versionless byte contract shared by both ends of a bridge connection.
//!
//! ## Philosophy
//!
//! - **No Negotiation**: Both executables are built against the same catalogue. A byte that
//!   does not decode is a broken deployment, not something to recover from.
//! - **Implicit Framing**: Only the header (opcode, identity, task id) has a fixed shape.
//!   Arguments and return values carry no length framing; each side must read exactly what
//!   the other wrote for that opcode.
//! - **Closed Catalogues**: Opcodes are a Rust enum matched exhaustively, never a raw byte.
//!
//! ## Format
//!
//! - **Call**: `[Opcode: 1b][Identity: 8b][Args: ?][Task: 8b]`
//! - **Return**: `[0xFF: 1b][Task: 8b][Results: ?]`
//! - **Object**: `[Handle: 8b]` (`0` = null)
//!
//! All integers are Little-Endian.

mod codec;
mod error;
mod ids;
mod method;

pub use codec::Sink;
pub use codec::Source;
pub use error::Error;
pub use error::Result;
pub use ids::Handle;
pub use ids::Side;
pub use ids::TaskId;
pub use ids::ThreadIdentity;
pub use method::Method;
pub use method::Opcode;
pub use method::RETURN_OPCODE;

#[cfg(test)]
mod tests;
