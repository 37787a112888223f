//! Connector error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Failures a connector reports to the command queue
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectorError {
    #[error("device selection canceled by user")]
    UserCanceledSelection,

    #[error("device selection failed: {0}")]
    SelectionFailed(String),

    #[error("no device selected")]
    DeviceNotSelected,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection timed out")]
    ConnectionTimeout,

    #[error("device disconnected")]
    DeviceDisconnected,

    #[error("deliver failed: {0}")]
    DeliverFailed(String),

    #[error("transmit failed: {0}")]
    TransmitFailed(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("write error: {0}")]
    WriteError(String),

    #[error("clock write failed")]
    ClockWriteFailed,

    #[error("clock read failed")]
    ClockReadFailed,

    #[error("firmware update failed: {0}")]
    UpdateFailed(String),

    #[error("unknown connector kind: {0}")]
    UnknownKind(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] spectoda_core::Error),
}

impl ConnectorError {
    /// Stable tag callers can branch on
    pub fn code(&self) -> &'static str {
        match self {
            ConnectorError::UserCanceledSelection => "UserCanceledSelection",
            ConnectorError::SelectionFailed(_) => "SelectionFailed",
            ConnectorError::DeviceNotSelected => "DeviceNotSelected",
            ConnectorError::ConnectionFailed(_) => "ConnectionFailed",
            ConnectorError::ConnectionTimeout => "ConnectionTimeout",
            ConnectorError::DeviceDisconnected => "DeviceDisconnected",
            ConnectorError::DeliverFailed(_) => "DeliverFailed",
            ConnectorError::TransmitFailed(_) => "TransmitFailed",
            ConnectorError::RequestFailed(_) => "RequestFailed",
            ConnectorError::WriteError(_) => "WriteError",
            ConnectorError::ClockWriteFailed => "ClockWriteFailed",
            ConnectorError::ClockReadFailed => "ClockReadFailed",
            ConnectorError::UpdateFailed(_) => "UpdateFailed",
            ConnectorError::UnknownKind(_) => "UnknownConnector",
            ConnectorError::Protocol(e) => e.code(),
        }
    }
}
