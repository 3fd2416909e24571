//! Strongly-typed identifiers that travel in frame headers.
//!
//! Each of these is a plain `u64` on the wire. The newtypes exist so a task id can never
//! be written where a handle is expected.

/// Which end of the connection minted a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// The listening side.
    Primary,
    /// The connecting side.
    Secondary,
}

/// Names the logical thread that originated a call.
///
/// Only ever compared for equality. Bit 63 records the minting side so the two processes
/// can allocate independently without colliding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadIdentity(pub u64);

impl ThreadIdentity {
    const SIDE_BIT: u64 = 1 << 63;

    /// Mints the `serial`-th identity for `side`.
    pub fn new(side: Side, serial: u64) -> Self {
        let serial = serial & !Self::SIDE_BIT;
        match side {
            Side::Primary => ThreadIdentity(serial),
            Side::Secondary => ThreadIdentity(serial | Self::SIDE_BIT),
        }
    }

    /// The side that minted this identity.
    pub fn side(self) -> Side {
        if self.0 & Self::SIDE_BIT == 0 { Side::Primary } else { Side::Secondary }
    }

    /// The per-side serial number.
    pub fn serial(self) -> u64 {
        self.0 & !Self::SIDE_BIT
    }
}

impl std::fmt::Display for ThreadIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = match self.side() {
            Side::Primary => "p",
            Side::Secondary => "s",
        };
        write!(f, "{}{}", side, self.serial())
    }
}

/// One outstanding call, scoped to the side that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Index into the wait-slot store.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// 1-based reference into the object table of the side that registered it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u64);

impl Handle {
    /// "No object".
    pub const NULL: Handle = Handle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The 0-based table slot, or `None` for the null handle.
    pub fn index(self) -> Option<usize> {
        self.0.checked_sub(1).map(|i| i as usize)
    }

    /// The handle that names table slot `index`.
    pub fn from_index(index: usize) -> Self {
        Handle(index as u64 + 1)
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "handle-null")
        } else {
            write!(f, "handle-{}", self.0)
        }
    }
}
