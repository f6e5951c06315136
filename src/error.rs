//! Error types for the phonebook protocol, store and client

use thiserror::Error;

use crate::model::{Command, FailureReason};

pub type Result<T> = std::result::Result<T, PhonebookError>;

#[derive(Error, Debug)]
pub enum PhonebookError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Response command {received} does not match request command {expected}")]
    CommandMismatch { expected: Command, received: Command },

    /// The server answered `success: false`; the connection is still good
    #[error("{command} rejected by server: {reason}")]
    Rejected { command: Command, reason: FailureReason },

    #[error("Unknown contact field: '{0}'")]
    InvalidField(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Coarse failure class, used to decide whether a connection survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connect, send or receive failed. The connection is dead.
    Transport,
    /// Bytes arrived but did not form a valid message. The connection is dead.
    Protocol,
    /// The store rejected or failed the operation. The connection survives.
    Store,
}

impl PhonebookError {
    /// Get error code for logs and the wire protocol
    pub fn code(&self) -> &'static str {
        match self {
            PhonebookError::Io(_) => "IO_ERROR",
            PhonebookError::ConnectionClosed => "CONNECTION_CLOSED",
            PhonebookError::NotConnected => "NOT_CONNECTED",
            PhonebookError::FrameTooLarge(_) => "FRAME_TOO_LARGE",
            PhonebookError::Encode(_) => "ENCODE_ERROR",
            PhonebookError::Decode(_) => "DECODE_ERROR",
            PhonebookError::CommandMismatch { .. } => "COMMAND_MISMATCH",
            PhonebookError::Rejected { reason, .. } => reason.as_str(),
            PhonebookError::InvalidField(_) => "INVALID_FIELD",
            PhonebookError::Sqlite(_) => "STORE_ERROR",
            PhonebookError::LockPoisoned => "STORE_ERROR",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            PhonebookError::Io(_)
            | PhonebookError::ConnectionClosed
            | PhonebookError::NotConnected => ErrorClass::Transport,
            PhonebookError::FrameTooLarge(_)
            | PhonebookError::Encode(_)
            | PhonebookError::Decode(_)
            | PhonebookError::CommandMismatch { .. } => ErrorClass::Protocol,
            PhonebookError::Rejected { .. }
            | PhonebookError::InvalidField(_)
            | PhonebookError::Sqlite(_)
            | PhonebookError::LockPoisoned => ErrorClass::Store,
        }
    }

    /// True if the error means the connection must be torn down.
    pub fn is_fatal_for_connection(&self) -> bool {
        !matches!(self.class(), ErrorClass::Store)
    }
}
