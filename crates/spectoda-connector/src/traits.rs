//! Connector capability contract

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::criteria::{ConnectedInfo, DeviceInfo, SelectedInfo, SelectionCriteria};
use crate::error::Result;

/// Phase of a firmware update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtaStatus {
    Begin,
    Success,
    Fail,
}

/// Asynchronous notifications a connector raises on its own
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    /// Transport session established
    Connected,
    /// Transport session torn down, clean or not
    Disconnected,
    /// Inbound command bytes from the network
    Data(Bytes),
    OtaStatus(OtaStatus),
    /// Firmware upload progress, 0 to 100
    OtaProgress(u8),
}

/// Channel a connector reports [`ConnectorEvent`]s on
pub type ConnectorEventSender = mpsc::UnboundedSender<ConnectorEvent>;
pub type ConnectorEventReceiver = mpsc::UnboundedReceiver<ConnectorEvent>;

/// Builds a connector wired to an event channel
pub type ConnectorFactory = Arc<dyn Fn(ConnectorEventSender) -> Arc<dyn Connector> + Send + Sync>;

/// Operations every transport adapter provides for its single selected device.
///
/// Operations that need a live session fail with
/// [`ConnectorError::DeviceDisconnected`](crate::ConnectorError::DeviceDisconnected)
/// when there is none.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Kind name this connector was assigned under
    fn kind(&self) -> &str;

    /// Let a user pick one matching device
    async fn user_select(
        &self,
        criteria: &[SelectionCriteria],
        timeout: Duration,
    ) -> Result<SelectedInfo>;

    /// Scan silently and pick the strongest match
    async fn auto_select(
        &self,
        criteria: &[SelectionCriteria],
        scan_duration: Duration,
        timeout: Duration,
    ) -> Result<SelectedInfo>;

    async fn selected(&self) -> Result<Option<SelectedInfo>>;

    async fn unselect(&self) -> Result<()>;

    async fn scan(
        &self,
        criteria: &[SelectionCriteria],
        scan_duration: Duration,
    ) -> Result<Vec<DeviceInfo>>;

    async fn connect(&self, timeout: Duration) -> Result<ConnectedInfo>;

    async fn connected(&self) -> Result<Option<ConnectedInfo>>;

    /// Tear the session down. Resolves even when teardown partially fails.
    async fn disconnect(&self) -> Result<()>;

    /// Reliable-intent send
    async fn deliver(&self, payload: Bytes, timeout: Duration) -> Result<()>;

    /// Best-effort send
    async fn transmit(&self, payload: Bytes, timeout: Duration) -> Result<()>;

    /// Send a request, returning the response when `read_response` is set
    async fn request(
        &self,
        payload: Bytes,
        read_response: bool,
        timeout: Duration,
    ) -> Result<Option<Bytes>>;

    /// Write the device clock, in network milliseconds
    async fn set_clock(&self, clock: u64) -> Result<()>;

    /// Read the device clock, in network milliseconds
    async fn get_clock(&self) -> Result<u64>;

    /// Run the full OTA sequence, reporting progress as [`ConnectorEvent`]s
    async fn update_fw(&self, firmware: Bytes) -> Result<()>;

    /// Best-effort disconnect and unselect for final teardown
    async fn destroy(&self) -> Result<()>;
}
