//! Link error types.

use std::time::Duration;

use master_protocol::{CommandCode, ProtocolError};
use thiserror::Error;

/// Why a single attempt did not produce a reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// Nothing matching arrived before the deadline.
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    /// A reply arrived but did not survive decoding.
    #[error("corrupt reply: {0}")]
    Corrupt(ProtocolError),
}

/// Errors raised while talking to the master.
#[derive(Error, Debug)]
pub enum CommunicationError {
    /// The only attempt timed out.
    #[error("no reply to {command} within {timeout:?}")]
    Timeout {
        /// Instruction code of the request.
        command: CommandCode,
        /// Deadline that passed.
        timeout: Duration,
    },

    /// Every attempt failed.
    #[error("{command} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Instruction code of the request.
        command: CommandCode,
        /// Number of attempts made.
        attempts: u32,
        /// Cause of the last failed attempt.
        last: AttemptFailure,
    },

    /// The channel reached end of stream, or the link worker stopped.
    #[error("channel closed")]
    ChannelClosed,

    /// The channel reported an I/O error.
    #[error("channel i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by a [`Link`](crate::Link).
#[derive(Error, Debug)]
pub enum LinkError {
    /// The request could not be delivered or answered.
    #[error(transparent)]
    Communication(#[from] CommunicationError),

    /// The request could not be framed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl LinkError {
    /// True when the link itself is gone and further requests are pointless.
    pub fn is_closed(&self) -> bool {
        matches!(self, LinkError::Communication(CommunicationError::ChannelClosed))
    }
}

/// Result type for link operations.
pub type LinkResult<T> = Result<T, LinkError>;
