//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while framing or decoding master traffic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload is too short to be valid.
    #[error("payload too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Payload does not fit in a frame.
    #[error("payload too long: maximum {max} bytes, got {actual}")]
    FrameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// Payload length differs from what the command defines.
    #[error("unexpected payload length for {command}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Instruction code.
        command: CommandCode,
        /// Length defined by the command.
        expected: usize,
        /// Length received.
        actual: usize,
    },

    /// Integrity code did not match the frame content.
    #[error("checksum mismatch: computed {computed:#06X}, received {received:#06X}")]
    ChecksumMismatch {
        /// Checksum computed over the received bytes.
        computed: u16,
        /// Checksum carried by the frame.
        received: u16,
    },

    /// A marker byte sequence was missing where the format expects one.
    #[error("missing {0} marker")]
    MissingMarker(&'static str),

    /// Instruction code is not part of the command set.
    #[error("unknown command code: {0}")]
    UnknownCommand(CommandCode),

    /// A field in the payload holds a value the command does not define.
    #[error("invalid {field} in {command}: {value:#04X}")]
    InvalidField {
        /// Instruction code.
        command: CommandCode,
        /// Field name.
        field: &'static str,
        /// Offending raw value.
        value: u8,
    },

    /// The reply does not answer the request it was matched to.
    #[error("unexpected response to {command}: {reason}")]
    UnexpectedResponse {
        /// Instruction code of the request.
        command: CommandCode,
        /// What did not match.
        reason: String,
    },

    /// The master refused a memory write.
    #[error("write rejected by master (result {0:#04X})")]
    WriteRejected(u8),
}

/// Two character instruction code, displayed as text when printable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandCode(pub [u8; 2]);

impl std::fmt::Display for CommandCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic()) {
            write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
        } else {
            write!(f, "0x{:02X}{:02X}", self.0[0], self.0[1])
        }
    }
}

impl From<[u8; 2]> for CommandCode {
    fn from(code: [u8; 2]) -> Self {
        CommandCode(code)
    }
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
