//! # Opcode Catalogues
//!
//! A catalogue is a closed enum of remote methods shared by both executables at build time.
//! The transport itself reserves a single byte, [`RETURN_OPCODE`], to mark reply frames.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::Error;
use crate::error::Result;

/// The distinguished opcode byte that opens every return frame.
pub const RETURN_OPCODE: u8 = 0xFF;

/// A closed set of remote methods.
///
/// Implementations must be a bijection between variants and bytes, and must never
/// produce [`RETURN_OPCODE`]. Use [`define_methods!`](crate::define_methods) rather than
/// implementing this by hand.
pub trait Method: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// The byte written on the wire for this method.
    fn to_wire(self) -> u8;

    /// Maps a wire byte back to a method, or `None` if the catalogue has no such entry.
    fn from_wire(byte: u8) -> Option<Self>;
}

/// The decoded first byte of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode<M> {
    /// An incoming invocation of a catalogue method.
    Call(M),
    /// A reply to a call this side issued earlier.
    Return,
}

impl<M: Method> Opcode<M> {
    /// Decodes a header byte.
    ///
    /// # Errors
    /// Returns `Error::UnknownOpcode` if the byte is outside the catalogue.
    pub fn decode(byte: u8) -> Result<Self> {
        if byte == RETURN_OPCODE {
            return Ok(Opcode::Return);
        }
        M::from_wire(byte).map(Opcode::Call).ok_or(Error::UnknownOpcode(byte))
    }

    /// Encodes the header byte. Total by construction.
    pub fn encode(self) -> u8 {
        match self {
            Opcode::Call(method) => method.to_wire(),
            Opcode::Return => RETURN_OPCODE,
        }
    }
}

/// Declares an opcode catalogue and derives its [`Method`](crate::Method) impl.
///
/// Every variant needs an explicit byte. A byte equal to the return opcode is rejected
/// at compile time.
///
/// ```
/// bridgewire::define_methods! {
///     pub enum Driver {
///         Factory = 0,
///         Init = 1,
///         RunFrame = 2,
///     }
/// }
///
/// use bridgewire::Method;
/// assert_eq!(Driver::from_wire(2), Some(Driver::RunFrame));
/// ```
#[macro_export]
macro_rules! define_methods {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $byte:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant = $byte ),+
        }

        impl $crate::Method for $name {
            fn to_wire(self) -> u8 {
                self as u8
            }

            fn from_wire(byte: u8) -> Option<Self> {
                match byte {
                    $( $byte => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        const _: () = {
            $( assert!($byte != $crate::RETURN_OPCODE, "method byte collides with the return opcode"); )+
        };
    };
}
