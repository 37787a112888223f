//! Application events

use serde::Serialize;
use spectoda_connector::OtaStatus;
use spectoda_core::{EventRecord, Mac, TimelineState};

use crate::state::ConnectionState;

/// Notification broadcast to every [`Spectoda::subscribe`](crate::Spectoda::subscribe) receiver
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SpectodaEvent {
    /// Connection state transition
    StateChanged(ConnectionState),
    /// Events decoded from one buffer, most recent first
    Events(Vec<EventRecord>),
    TimelineUpdated(TimelineState),
    PeerConnected(Mac),
    PeerDisconnected(Mac),
    /// A TNGL program was uploaded to the network
    TnglUpdated { clock_timestamp: u64, size: usize },
    OtaStatus(OtaStatus),
    OtaProgress(u8),
}
