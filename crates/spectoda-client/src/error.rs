//! Client error types

use spectoda_connector::ConnectorError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Failures surfaced to applications.
///
/// Every variant maps to a short stable tag through [`ClientError::code`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("no connector assigned")]
    ConnectorNotAssigned,

    #[error("connector not available: {0}")]
    ConnectorUnavailable(String),

    #[error("superseded by a newer clock read")]
    MultipleClockReads,

    #[error("adoption already in progress")]
    AdoptingInProgress,

    #[error("connection already in progress")]
    ConnectingInProgress,

    #[error("selection already in progress")]
    SelectingInProgress,

    #[error("timeout must be greater than zero")]
    InvalidTimeout,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("command queue closed")]
    InterfaceClosed,

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error("protocol error: {0}")]
    Protocol(#[from] spectoda_core::Error),
}

impl ClientError {
    /// Stable tag callers can branch on
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::ConnectorNotAssigned => "ConnectorNotAssigned",
            ClientError::ConnectorUnavailable(_) => "ConnectorUnavailable",
            ClientError::MultipleClockReads => "MultipleClockReads",
            ClientError::AdoptingInProgress => "AdoptingInProgress",
            ClientError::ConnectingInProgress => "ConnectingInProgress",
            ClientError::SelectingInProgress => "SelectingInProgress",
            ClientError::InvalidTimeout => "InvalidTimeout",
            ClientError::Timeout(_) => "Timeout",
            ClientError::InvalidArgument(_) => "InvalidArgument",
            ClientError::InterfaceClosed => "InterfaceClosed",
            ClientError::Connector(e) => e.code(),
            ClientError::Protocol(e) => e.code(),
        }
    }
}
