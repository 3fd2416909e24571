/// Wire decoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Byte is neither a catalogue method nor the return opcode.
    UnknownOpcode(u8),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownOpcode(b) => write!(f, "Unknown opcode byte: {:#04x}", b),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for wire operations.
pub type Result<T> = std::result::Result<T, Error>;
