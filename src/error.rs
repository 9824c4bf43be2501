//! Error types and the stable status-code set.
//!
//! `ErrorCode` is the wire-stable enumeration external callers match on
//! (prepare/step/bind all return it); `Error` pairs a code with a message
//! for diagnostics.

use std::fmt;

/// Stable status codes. Numeric values are part of the external contract:
/// callers may match on `code() as i32` and expect it not to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    Error = 1,
    Internal = 2,
    Abort = 4,
    Busy = 5,
    Readonly = 8,
    Interrupt = 9,
    NotFound = 12,
    Constraint = 19,
    Misuse = 21,
    Range = 25,
    Row = 100,
    Done = 101,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The crate's single error type: a status code plus a human-readable
/// message. Never carries a source chain — status codes are the contract,
/// not error types from dependencies.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    pub fn new(code: ErrorCode) -> Self {
        Error {
            code,
            message: code.to_string(),
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Error {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

pub type Result<T> = std::result::Result<T, Error>;
