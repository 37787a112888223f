//! Error types for the Spectoda protocol layer

use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A read would run past the end of the buffer
    #[error("read out of range: {requested} bytes at offset {offset}, {available} available")]
    ReadOutOfRange {
        offset: usize,
        requested: usize,
        available: usize,
    },

    /// A peek would run past the end of the buffer
    #[error("peek out of range: {requested} bytes at offset {offset}, {available} available")]
    PeekOutOfRange {
        offset: usize,
        requested: usize,
        available: usize,
    },

    /// A write would run past the writer capacity
    #[error("write out of range: {requested} bytes at offset {offset}, capacity {capacity}")]
    WriteOutOfRange {
        offset: usize,
        requested: usize,
        capacity: usize,
    },

    /// Integer width outside of 1, 2, 4, 6, 8 bytes
    #[error("unsupported integer width: {0} bytes")]
    UnsupportedWidth(usize),

    /// TNGL source could not be compiled
    #[error("compilation error at offset {offset}: {reason} (token {token:?})")]
    Compilation {
        token: String,
        offset: usize,
        reason: String,
    },

    /// Response carries an unexpected flag byte
    #[error("invalid response flag: expected {expected}, got {actual}")]
    InvalidResponseFlag { expected: u8, actual: u8 },

    /// Response echoes a different request id
    #[error("invalid response uuid: expected {expected:#010x}, got {actual:#010x}")]
    InvalidResponseUuid { expected: u32, actual: u32 },

    /// Response reports a device side error
    #[error("device returned error code {0}")]
    ResponseError(u8),

    /// Invalid value for a protocol field
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl Error {
    /// Stable tag identifying the error kind
    pub fn code(&self) -> &'static str {
        match self {
            Error::ReadOutOfRange { .. } => "ReadOutOfRange",
            Error::PeekOutOfRange { .. } => "PeekOutOfRange",
            Error::WriteOutOfRange { .. } => "WriteOutOfRange",
            Error::UnsupportedWidth(_) => "UnsupportedWidth",
            Error::Compilation { .. } => "CompilationError",
            Error::InvalidResponseFlag { .. } => "InvalidResponseFlag",
            Error::InvalidResponseUuid { .. } => "InvalidResponseUuid",
            Error::ResponseError(_) => "RequestFailed",
            Error::InvalidValue(_) => "InvalidValue",
        }
    }
}
