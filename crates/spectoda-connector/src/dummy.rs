//! In-memory reference connector
//!
//! `DummyConnector` simulates one controller network: a fixed list of
//! discoverable devices, a device clock, a TNGL store fed by delivered
//! payloads, and canned answers to the device requests. The `edummy` flavour
//! makes every transport operation fail with a configurable probability.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::{debug, info, warn};

use spectoda_core::constants::command;
use spectoda_core::decoder::Record;
use spectoda_core::request::{
    decode_request, encode_response, DEVICE_NAME_SIZE, FW_VERSION_SIZE, OWNER_KEY_SIZE,
    OWNER_SIGNATURE_SIZE, TNGL_FINGERPRINT_SIZE,
};
use spectoda_core::{time, Decoder, Mac, Reader, TimeTrack, Writer};

use crate::criteria::{matches_any, ConnectedInfo, DeviceInfo, SelectedInfo, SelectionCriteria};
use crate::error::{ConnectorError, Result};
use crate::traits::{Connector, ConnectorEvent, ConnectorEventSender, OtaStatus};

/// Failure probability of the `edummy` connector
pub const DEFAULT_FAILURE_RATE: f64 = 0.1;

/// Attempts made by clock reads and writes before giving up
pub const CLOCK_ATTEMPTS: u32 = 3;

/// Behaviour of a [`DummyConnector`]
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Devices visible to selection and scanning
    pub devices: Vec<DeviceInfo>,
    /// Simulated round trip of every operation
    pub latency: Duration,
    /// Initial probability in [0, 1] that an operation fails
    pub failure_rate: f64,
    /// Sleep between clock attempts
    pub clock_retry_backoff: Duration,
    /// Bytes written per OTA step
    pub ota_chunk_size: usize,
    pub fw_version: String,
    /// Peers reported by the connected peers request
    pub peers: Vec<(Mac, i16)>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            devices: vec![DeviceInfo {
                name: "SC_DUMMY".to_string(),
                mac: Some(Mac([0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc])),
                fw_version: Some("DUMMY_0.12.0_20240101".to_string()),
                owner_signature: None,
                product_code: Some(0),
                adoption_flag: true,
                rssi: Some(-50),
            }],
            latency: Duration::from_millis(5),
            failure_rate: 0.0,
            clock_retry_backoff: Duration::from_millis(20),
            ota_chunk_size: 4096,
            fw_version: "DUMMY_0.12.0_20240101".to_string(),
            peers: Vec::new(),
        }
    }
}

impl DummyConfig {
    /// Same network, failing at [`DEFAULT_FAILURE_RATE`]
    pub fn unreliable() -> Self {
        Self {
            failure_rate: DEFAULT_FAILURE_RATE,
            ..Self::default()
        }
    }
}

struct DummyState {
    failure_rate: f64,
    selected: Option<SelectedInfo>,
    connected: bool,
    clock: TimeTrack,
    decoder: Decoder,
    tngl_fingerprint: [u8; TNGL_FINGERPRINT_SIZE],
    device_config: String,
}

/// Simulated connector
pub struct DummyConnector {
    kind: String,
    config: DummyConfig,
    events: ConnectorEventSender,
    state: Mutex<DummyState>,
}

impl DummyConnector {
    /// Reliable dummy connector
    pub fn new(events: ConnectorEventSender) -> Self {
        Self::with_config("dummy", DummyConfig::default(), events)
    }

    /// Dummy connector with injected random failures
    pub fn unreliable(events: ConnectorEventSender) -> Self {
        Self::with_config("edummy", DummyConfig::unreliable(), events)
    }

    pub fn with_config(kind: &str, config: DummyConfig, events: ConnectorEventSender) -> Self {
        Self {
            kind: kind.to_string(),
            events,
            state: Mutex::new(DummyState {
                failure_rate: config.failure_rate,
                selected: None,
                connected: false,
                clock: TimeTrack::new(time::now(), false),
                decoder: Decoder::new(),
                tngl_fingerprint: [0; TNGL_FINGERPRINT_SIZE],
                device_config: "{}".to_string(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Fingerprint of the last TNGL program delivered to the simulated network
    pub fn tngl_fingerprint(&self) -> [u8; TNGL_FINGERPRINT_SIZE] {
        self.state.lock().tngl_fingerprint
    }

    /// Inject inbound bytes as if the network had sent them
    pub fn push_inbound(&self, bytes: Bytes) {
        self.emit(ConnectorEvent::Data(bytes));
    }

    fn emit(&self, event: ConnectorEvent) {
        if self.events.send(event).is_err() {
            debug!("{} connector event dropped, no listener", self.kind);
        }
    }

    /// Change the failure probability of subsequent operations
    pub fn set_failure_rate(&self, rate: f64) {
        self.state.lock().failure_rate = rate.clamp(0.0, 1.0);
    }

    fn should_fail(&self) -> bool {
        let rate = self.state.lock().failure_rate;
        rate > 0.0 && rand::thread_rng().gen_bool(rate.min(1.0))
    }

    async fn round_trip(&self) {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state.lock().connected {
            Ok(())
        } else {
            Err(ConnectorError::DeviceDisconnected)
        }
    }

    fn validate(criteria: &[SelectionCriteria]) -> Result<()> {
        criteria.iter().try_for_each(SelectionCriteria::validate)
    }

    fn matching(&self, criteria: &[SelectionCriteria]) -> Vec<DeviceInfo> {
        self.config
            .devices
            .iter()
            .filter(|device| matches_any(criteria, device))
            .cloned()
            .collect()
    }

    fn select(&self, device: &DeviceInfo) -> SelectedInfo {
        let info = SelectedInfo {
            connector: self.kind.clone(),
            name: device.name.clone(),
            mac: device.mac,
        };
        self.state.lock().selected = Some(info.clone());
        info
    }

    /// Mark the session closed, notifying only on an actual transition
    fn drop_session(&self) {
        let was_connected = std::mem::replace(&mut self.state.lock().connected, false);
        if was_connected {
            info!("{} connector disconnected", self.kind);
            self.emit(ConnectorEvent::Disconnected);
        }
    }

    /// Track TNGL uploads carried by delivered payloads
    fn absorb(&self, payload: &[u8]) {
        let mut state = self.state.lock();
        let network_millis = state.clock.millis();
        let decoded = state.decoder.decode(payload, network_millis);
        for record in decoded.records {
            if let Record::TnglBytes { bytecode, .. } = record {
                state.tngl_fingerprint = fingerprint(&bytecode);
                debug!("dummy network received {} bytes of TNGL", bytecode.len());
            }
        }
    }

    fn respond(&self, payload: &[u8]) -> Result<Option<Bytes>> {
        let (flag, uuid, body) = decode_request(payload)?;

        let response_body = match flag {
            command::FW_VERSION_REQUEST => {
                let mut writer = Writer::new(FW_VERSION_SIZE);
                writer.write_string(&self.config.fw_version, FW_VERSION_SIZE)?;
                writer.bytes().to_vec()
            }
            command::TNGL_FINGERPRINT_REQUEST => self.state.lock().tngl_fingerprint.to_vec(),
            command::CONNECTED_PEERS_INFO_REQUEST => {
                let peers = &self.config.peers;
                let mut writer = Writer::new(2 + peers.len() * (Mac::SIZE + 2));
                writer.write_u16(peers.len() as u16)?;
                for (mac, rssi) in peers {
                    writer.write_mac(mac)?;
                    writer.write_i16(*rssi)?;
                }
                writer.bytes().to_vec()
            }
            command::DEVICE_CONFIG_REQUEST => {
                let config = self.state.lock().device_config.clone();
                let mut writer = Writer::new(4 + config.len());
                writer.write_u32(config.len() as u32)?;
                writer.write_string(&config, config.len())?;
                writer.bytes().to_vec()
            }
            command::CONFIG_UPDATE_REQUEST => {
                let mut reader = Reader::new(body);
                let length = reader.read_u32()? as usize;
                let config = reader.read_string(length)?;
                debug!("dummy device config updated ({} bytes)", config.len());
                self.state.lock().device_config = config;
                Vec::new()
            }
            command::ADOPT_REQUEST => {
                let mut reader = Reader::new(body);
                reader.read_bytes(OWNER_SIGNATURE_SIZE + OWNER_KEY_SIZE)?;
                let name = reader.read_string(DEVICE_NAME_SIZE)?;
                let mac = self
                    .state
                    .lock()
                    .selected
                    .as_ref()
                    .and_then(|s| s.mac)
                    .unwrap_or_default();

                let mut writer = Writer::new(Mac::SIZE + DEVICE_NAME_SIZE);
                writer.write_mac(&mac)?;
                writer.write_bytes(name.as_bytes(), DEVICE_NAME_SIZE)?;
                writer.bytes().to_vec()
            }
            command::DEVICE_REBOOT_REQUEST => {
                info!("dummy device rebooting");
                self.drop_session();
                return Ok(None);
            }
            other => {
                return Err(ConnectorError::RequestFailed(format!(
                    "unsupported request flag {}",
                    other
                )));
            }
        };

        let response_flag = command::response_flag(flag).ok_or_else(|| {
            ConnectorError::RequestFailed(format!("flag {} has no response", flag))
        })?;
        Ok(Some(encode_response(response_flag, uuid, 0, &response_body)?))
    }
}

/// Deterministic 32-byte digest standing in for the controller's TNGL hash
fn fingerprint(bytecode: &[u8]) -> [u8; TNGL_FINGERPRINT_SIZE] {
    let mut out = [0u8; TNGL_FINGERPRINT_SIZE];
    for (round, chunk) in out.chunks_mut(8).enumerate() {
        let mut hasher = DefaultHasher::new();
        round.hash(&mut hasher);
        bytecode.hash(&mut hasher);
        chunk.copy_from_slice(&hasher.finish().to_le_bytes());
    }
    out
}

#[async_trait]
impl Connector for DummyConnector {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn user_select(
        &self,
        criteria: &[SelectionCriteria],
        _timeout: Duration,
    ) -> Result<SelectedInfo> {
        Self::validate(criteria)?;
        self.round_trip().await;

        // The simulated user picks the first device offered
        match self.matching(criteria).first() {
            Some(device) => Ok(self.select(device)),
            None => Err(ConnectorError::UserCanceledSelection),
        }
    }

    async fn auto_select(
        &self,
        criteria: &[SelectionCriteria],
        scan_duration: Duration,
        timeout: Duration,
    ) -> Result<SelectedInfo> {
        Self::validate(criteria)?;
        self.round_trip().await;

        if self.should_fail() {
            return Err(ConnectorError::SelectionFailed("simulated scan failure".to_string()));
        }

        let strongest = self
            .matching(criteria)
            .into_iter()
            .max_by_key(|device| device.rssi.unwrap_or(i16::MIN));

        match strongest {
            Some(device) => Ok(self.select(&device)),
            None => Err(ConnectorError::SelectionFailed(format!(
                "no matching device within {:?} (timeout {:?})",
                scan_duration, timeout
            ))),
        }
    }

    async fn selected(&self) -> Result<Option<SelectedInfo>> {
        Ok(self.state.lock().selected.clone())
    }

    async fn unselect(&self) -> Result<()> {
        self.drop_session();
        self.state.lock().selected = None;
        Ok(())
    }

    async fn scan(
        &self,
        criteria: &[SelectionCriteria],
        _scan_duration: Duration,
    ) -> Result<Vec<DeviceInfo>> {
        Self::validate(criteria)?;
        self.round_trip().await;
        Ok(self.matching(criteria))
    }

    async fn connect(&self, timeout: Duration) -> Result<ConnectedInfo> {
        let selected = self
            .state
            .lock()
            .selected
            .clone()
            .ok_or(ConnectorError::DeviceNotSelected)?;

        if self.config.latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(ConnectorError::ConnectionTimeout);
        }
        self.round_trip().await;

        if self.should_fail() {
            return Err(ConnectorError::ConnectionFailed(
                "simulated connection failure".to_string(),
            ));
        }

        let newly_connected = !std::mem::replace(&mut self.state.lock().connected, true);
        if newly_connected {
            info!("{} connector connected to {}", self.kind, selected.name);
            self.emit(ConnectorEvent::Connected);
        }
        Ok(selected.into())
    }

    async fn connected(&self) -> Result<Option<ConnectedInfo>> {
        let state = self.state.lock();
        Ok(if state.connected {
            state.selected.clone().map(ConnectedInfo::from)
        } else {
            None
        })
    }

    async fn disconnect(&self) -> Result<()> {
        self.round_trip().await;
        self.drop_session();
        Ok(())
    }

    async fn deliver(&self, payload: Bytes, _timeout: Duration) -> Result<()> {
        self.ensure_connected()?;
        self.round_trip().await;

        if self.should_fail() {
            return Err(ConnectorError::DeliverFailed("simulated deliver failure".to_string()));
        }

        debug!("dummy deliver of {} bytes", payload.len());
        self.absorb(&payload);
        Ok(())
    }

    async fn transmit(&self, payload: Bytes, _timeout: Duration) -> Result<()> {
        self.ensure_connected()?;
        self.round_trip().await;

        if self.should_fail() {
            return Err(ConnectorError::TransmitFailed("simulated transmit failure".to_string()));
        }

        debug!("dummy transmit of {} bytes", payload.len());
        self.absorb(&payload);
        Ok(())
    }

    async fn request(
        &self,
        payload: Bytes,
        read_response: bool,
        _timeout: Duration,
    ) -> Result<Option<Bytes>> {
        self.ensure_connected()?;
        self.round_trip().await;

        if self.should_fail() {
            return Err(ConnectorError::RequestFailed("simulated request failure".to_string()));
        }

        let response = self.respond(&payload)?;
        Ok(if read_response { response } else { None })
    }

    async fn set_clock(&self, clock: u64) -> Result<()> {
        self.ensure_connected()?;

        for attempt in 1..=CLOCK_ATTEMPTS {
            self.round_trip().await;
            if !self.should_fail() {
                self.state.lock().clock.set_millis(clock as i64);
                return Ok(());
            }
            warn!("clock write attempt {}/{} failed", attempt, CLOCK_ATTEMPTS);
            if attempt < CLOCK_ATTEMPTS {
                tokio::time::sleep(self.config.clock_retry_backoff).await;
            }
        }
        Err(ConnectorError::ClockWriteFailed)
    }

    async fn get_clock(&self) -> Result<u64> {
        self.ensure_connected()?;

        for attempt in 1..=CLOCK_ATTEMPTS {
            self.round_trip().await;
            if !self.should_fail() {
                return Ok(self.state.lock().clock.millis().max(0) as u64);
            }
            warn!("clock read attempt {}/{} failed", attempt, CLOCK_ATTEMPTS);
            if attempt < CLOCK_ATTEMPTS {
                tokio::time::sleep(self.config.clock_retry_backoff).await;
            }
        }
        Err(ConnectorError::ClockReadFailed)
    }

    async fn update_fw(&self, firmware: Bytes) -> Result<()> {
        self.ensure_connected()?;

        if firmware.is_empty() {
            return Err(ConnectorError::UpdateFailed("empty firmware image".to_string()));
        }

        info!("dummy OTA of {} bytes", firmware.len());
        self.emit(ConnectorEvent::OtaStatus(OtaStatus::Begin));
        self.emit(ConnectorEvent::OtaProgress(0));

        // reset + begin
        self.round_trip().await;
        self.round_trip().await;

        let chunk_size = self.config.ota_chunk_size.max(1);
        let mut written = 0usize;
        for chunk in firmware.chunks(chunk_size) {
            self.round_trip().await;
            if self.should_fail() || !self.state.lock().connected {
                self.emit(ConnectorEvent::OtaStatus(OtaStatus::Fail));
                return Err(ConnectorError::UpdateFailed(format!(
                    "write failed at offset {}",
                    written
                )));
            }
            written += chunk.len();
            let percent = (written * 100 / firmware.len()) as u8;
            self.emit(ConnectorEvent::OtaProgress(percent));
        }

        // end
        self.round_trip().await;
        self.emit(ConnectorEvent::OtaStatus(OtaStatus::Success));

        // the controller reboots into the new image
        self.drop_session();
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        if let Err(e) = self.disconnect().await {
            warn!("disconnect during destroy failed: {}", e);
        }
        if let Err(e) = self.unselect().await {
            warn!("unselect during destroy failed: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectoda_core::request::{encode_request, parse_response};
    use tokio::sync::mpsc;

    fn connector() -> (DummyConnector, mpsc::UnboundedReceiver<ConnectorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (DummyConnector::new(tx), rx)
    }

    #[tokio::test]
    async fn test_connect_requires_selection() {
        let (dummy, _rx) = connector();
        let err = dummy.connect(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, ConnectorError::DeviceNotSelected);
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let (dummy, mut rx) = connector();
        dummy.user_select(&[], Duration::from_secs(1)).await.unwrap();
        dummy.connect(Duration::from_secs(1)).await.unwrap();
        dummy.disconnect().await.unwrap();
        dummy.disconnect().await.unwrap();

        assert_eq!(rx.recv().await, Some(ConnectorEvent::Connected));
        assert_eq!(rx.recv().await, Some(ConnectorEvent::Disconnected));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deliver_without_session() {
        let (dummy, _rx) = connector();
        let err = dummy
            .deliver(Bytes::from_static(&[1]), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DeviceDisconnected");
    }

    #[tokio::test]
    async fn test_fw_version_request() {
        let (dummy, _rx) = connector();
        dummy.user_select(&[], Duration::from_secs(1)).await.unwrap();
        dummy.connect(Duration::from_secs(1)).await.unwrap();

        let request = encode_request(command::FW_VERSION_REQUEST, 42, &[]).unwrap();
        let response = dummy.request(request, true, Duration::from_secs(1)).await.unwrap().unwrap();
        let mut body = parse_response(&response, command::FW_VERSION_REQUEST, 42).unwrap();
        assert_eq!(body.read_string(FW_VERSION_SIZE).unwrap(), "DUMMY_0.12.0_20240101");
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(fingerprint(&[1, 2, 3]), fingerprint(&[1, 2, 3]));
        assert_ne!(fingerprint(&[1, 2, 3]), fingerprint(&[3, 2, 1]));
    }
}
