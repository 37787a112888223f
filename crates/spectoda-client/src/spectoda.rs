//! Spectoda client
//!
//! [`Spectoda`] owns one command queue and the network clock and timeline
//! that go with it. Everything that touches a device, from emitting an event
//! to a firmware update, is queued through the [`Interface`].

use bytes::Bytes;
use dashmap::DashMap;
use spectoda_connector::{
    ConnectedInfo, Connector, ConnectorError, ConnectorEventSender, ConnectorFactory, ConnectorKind,
    DeviceInfo, DummyConnector, SelectedInfo, SelectionCriteria,
};
use spectoda_core::constants::command;
use spectoda_core::frame::{encode_event, encode_set_timeline, encode_tngl_bytes, event_tag};
use spectoda_core::request::{encode_request, parse_response};
use spectoda_core::{Color, EventValue, Label, TimeTrack, TnglCompiler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::builder::SpectodaBuilder;
use crate::config::ClientConfig;
use crate::device::{self, AdoptedDevice, PeerInfo};
use crate::error::{ClientError, Result};
use crate::event::SpectodaEvent;
use crate::interface::{update_clock, Interface, SharedClock};
use crate::state::ConnectionState;

/// Coalescing key of TNGL uploads
pub const TNGL_KEY: &str = "tngl";

/// Coalescing key of timeline updates
pub const TIMELINE_KEY: &str = "timeline";

/// Clears an in-progress flag when dropped
struct InProgress<'a>(&'a AtomicBool);

impl<'a> InProgress<'a> {
    fn begin(flag: &'a AtomicBool, busy: ClientError) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| busy)
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A client for one Spectoda controller network
pub struct Spectoda {
    interface: Interface,
    events: broadcast::Sender<SpectodaEvent>,
    factories: DashMap<ConnectorKind, ConnectorFactory>,
    selecting: AtomicBool,
    connecting: AtomicBool,
    adopting: AtomicBool,
}

impl Spectoda {
    /// Create a client with no connector assigned
    pub fn new(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            interface: Interface::new(config, events.clone()),
            events,
            factories: DashMap::new(),
            selecting: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            adopting: AtomicBool::new(false),
        }
    }

    pub fn builder() -> SpectodaBuilder {
        SpectodaBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        self.interface.config()
    }

    /// The underlying command queue
    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    /// Receive application events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SpectodaEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.interface.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Network clock shared with the decoder
    pub fn clock(&self) -> SharedClock {
        self.interface.clock()
    }

    /// Application timeline
    pub fn timeline(&self) -> SharedClock {
        self.interface.timeline()
    }

    // ========================================================================
    // Connector assignment
    // ========================================================================

    /// Make `factory` available to [`assign_connector`](Self::assign_connector)
    pub fn register_connector(&self, kind: ConnectorKind, factory: ConnectorFactory) {
        debug!("registered {} connector factory", kind);
        self.factories.insert(kind, factory);
    }

    /// Tear down the current connector and assign one of `kind`.
    ///
    /// `dummy` and `edummy` are built in; other kinds need a registered
    /// factory. `automatic` takes the first registered kind in
    /// [`ConnectorKind::AUTOMATIC_PRIORITY`] order and `none` only unassigns.
    pub async fn assign_connector(&self, kind: &str) -> Result<()> {
        let kind: ConnectorKind = kind.parse()?;

        let factory: Option<ConnectorFactory> = match kind {
            ConnectorKind::None | ConnectorKind::Dummy | ConnectorKind::EDummy => None,
            ConnectorKind::Automatic => {
                let probed = ConnectorKind::AUTOMATIC_PRIORITY.iter().find_map(|candidate| {
                    let factory = self.factories.get(candidate)?;
                    Some((*candidate, Arc::clone(factory.value())))
                });
                match probed {
                    Some((candidate, factory)) => {
                        info!("automatic connector selection picked {}", candidate);
                        Some(factory)
                    }
                    None => {
                        return Err(ClientError::ConnectorUnavailable(
                            "no connector registered for automatic selection".to_string(),
                        ))
                    }
                }
            }
            other => Some(
                self.factories
                    .get(&other)
                    .map(|f| Arc::clone(f.value()))
                    .ok_or_else(|| ClientError::ConnectorUnavailable(other.to_string()))?,
            ),
        };

        self.interface.destroy_connector().await?;

        match (kind, factory) {
            (_, Some(factory)) => {
                self.interface.attach_factory(&factory);
            }
            (ConnectorKind::Dummy, None) => {
                self.interface.attach(DummyConnector::new);
            }
            (ConnectorKind::EDummy, None) => {
                self.interface.attach(DummyConnector::unreliable);
            }
            _ => info!("connector unassigned"),
        }
        Ok(())
    }

    /// Tear down the current connector and assign one built by `build`
    pub async fn attach_connector<C, F>(&self, build: F) -> Result<Arc<C>>
    where
        C: Connector + 'static,
        F: FnOnce(ConnectorEventSender) -> C,
    {
        self.interface.destroy_connector().await?;
        Ok(self.interface.attach(build))
    }

    /// Kind of the assigned connector, if any
    pub fn connector_kind(&self) -> Option<String> {
        self.interface.connector_kind()
    }

    // ========================================================================
    // Selection and connection
    // ========================================================================

    /// Let the user pick a device
    pub async fn user_select(
        &self,
        criteria: &[SelectionCriteria],
        timeout: Duration,
    ) -> Result<SelectedInfo> {
        let _selecting = InProgress::begin(&self.selecting, ClientError::SelectingInProgress)?;
        self.interface.user_select(criteria.to_vec(), timeout).await
    }

    /// Pick the best device matching `criteria` without user interaction
    pub async fn auto_select(
        &self,
        criteria: &[SelectionCriteria],
        scan_duration: Duration,
        timeout: Duration,
    ) -> Result<SelectedInfo> {
        let _selecting = InProgress::begin(&self.selecting, ClientError::SelectingInProgress)?;
        self.interface.auto_select(criteria.to_vec(), scan_duration, timeout).await
    }

    pub async fn scan(
        &self,
        criteria: &[SelectionCriteria],
        scan_duration: Duration,
    ) -> Result<Vec<DeviceInfo>> {
        let _selecting = InProgress::begin(&self.selecting, ClientError::SelectingInProgress)?;
        self.interface.scan(criteria.to_vec(), scan_duration).await
    }

    pub async fn selected(&self) -> Result<Option<SelectedInfo>> {
        self.interface.selected().await
    }

    pub async fn unselect(&self) -> Result<()> {
        self.interface.unselect().await
    }

    /// Connect to the selected device, auto-selecting any device first when
    /// nothing is selected
    pub async fn connect(&self) -> Result<ConnectedInfo> {
        self.connect_with(&[], true).await
    }

    /// Connect to the selected device. When nothing is selected, a device
    /// matching `criteria` is chosen automatically or by the user.
    pub async fn connect_with(
        &self,
        criteria: &[SelectionCriteria],
        auto_select: bool,
    ) -> Result<ConnectedInfo> {
        let _connecting = InProgress::begin(&self.connecting, ClientError::ConnectingInProgress)?;
        let config = self.interface.config();

        if self.interface.selected().await?.is_none() {
            let selected = if auto_select {
                self.auto_select(criteria, config.scan_duration(), config.connect_timeout()).await?
            } else {
                self.user_select(criteria, config.connect_timeout()).await?
            };
            debug!("selected {} for connection", selected.name);
        }

        self.interface.connect(config.connect_timeout()).await
    }

    pub async fn connected(&self) -> Result<Option<ConnectedInfo>> {
        self.interface.connected().await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.interface.disconnect().await
    }

    // ========================================================================
    // Events and TNGL
    // ========================================================================

    /// Queue raw bytecode, optionally coalesced under `key`
    pub async fn execute(&self, bytecode: Bytes, key: Option<String>) -> Result<()> {
        self.interface.execute(bytecode, key).await
    }

    async fn emit(&self, value: EventValue, label: &str, id: u8) -> Result<()> {
        let label = Label::new(label);
        let frame = encode_event(&value, &label, self.interface.clock_millis(), id)?;
        let key = format!("{}:{}:{}", event_tag(&value), label.as_str(), id);
        self.interface.execute(frame, Some(key)).await
    }

    /// Emit a value-less event to device `id` (0xFF broadcasts)
    pub async fn emit_event(&self, label: &str, id: u8) -> Result<()> {
        self.emit(EventValue::None, label, id).await
    }

    pub async fn emit_timestamp(&self, label: &str, millis: i32, id: u8) -> Result<()> {
        self.emit(EventValue::Timestamp(millis), label, id).await
    }

    pub async fn emit_color(&self, label: &str, color: Color, id: u8) -> Result<()> {
        self.emit(EventValue::Color(color), label, id).await
    }

    /// Emit a percentage, clamped to [-100, 100]
    pub async fn emit_percentage(&self, label: &str, percent: f64, id: u8) -> Result<()> {
        self.emit(EventValue::Percentage(percent.clamp(-100.0, 100.0)), label, id).await
    }

    pub async fn emit_label(&self, label: &str, value: &str, id: u8) -> Result<()> {
        self.emit(EventValue::Label(Label::new(value)), label, id).await
    }

    /// Compile `source` and upload it to the network
    pub async fn write_tngl(&self, source: &str) -> Result<()> {
        let mut compiler = TnglCompiler::new();
        let bytecode = compiler.compile(source)?;
        for warning in compiler.warnings() {
            warn!("tngl: {}", warning);
        }
        self.write_tngl_bytes(&bytecode).await
    }

    /// Upload already compiled bytecode
    pub async fn write_tngl_bytes(&self, bytecode: &[u8]) -> Result<()> {
        let frame = encode_tngl_bytes(self.interface.clock_millis(), bytecode)?;
        info!("uploading {} bytes of tngl", bytecode.len());
        self.interface.execute(frame, Some(TNGL_KEY.to_string())).await
    }

    // ========================================================================
    // Timeline and clock
    // ========================================================================

    /// Broadcast the local timeline to the network
    pub async fn sync_timeline(&self) -> Result<()> {
        let (millis, paused) = {
            let timeline = self.interface.timeline();
            let timeline = timeline.lock();
            (timeline.millis(), timeline.paused())
        };
        let millis = millis.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        let frame = encode_set_timeline(self.interface.clock_millis(), millis, paused)?;
        self.interface.execute(frame, Some(TIMELINE_KEY.to_string())).await
    }

    pub async fn set_timeline(&self, millis: i64, paused: bool) -> Result<()> {
        update_clock(&self.interface.timeline(), |track| track.set_state(millis, paused));
        self.sync_timeline().await
    }

    pub async fn pause_timeline(&self) -> Result<()> {
        update_clock(&self.interface.timeline(), TimeTrack::pause);
        self.sync_timeline().await
    }

    pub async fn play_timeline(&self) -> Result<()> {
        update_clock(&self.interface.timeline(), TimeTrack::unpause);
        self.sync_timeline().await
    }

    /// Read the device clock into the network clock
    pub async fn sync_clock(&self) -> Result<u64> {
        self.interface.get_clock().await
    }

    /// Push the network clock to the device
    pub async fn set_device_clock(&self) -> Result<()> {
        self.interface.set_clock(self.interface.clock_millis()).await
    }

    // ========================================================================
    // Device requests
    // ========================================================================

    async fn request(&self, flag: u8, body: &[u8]) -> Result<Bytes> {
        let uuid: u32 = rand::random();
        let payload = encode_request(flag, uuid, body)?;
        debug!("request flag {} uuid {:#010x}", flag, uuid);

        let timeout = self.interface.config().default_timeout();
        let response = self
            .interface
            .request(payload, true, timeout)
            .await?
            .ok_or_else(|| {
                ConnectorError::RequestFailed(format!("no response to request flag {flag}"))
            })?;

        let reader = parse_response(&response, flag, uuid)?;
        Ok(Bytes::copy_from_slice(reader.remaining()))
    }

    pub async fn get_fw_version(&self) -> Result<String> {
        let body = self.request(command::FW_VERSION_REQUEST, &[]).await?;
        device::read_fw_version(&body)
    }

    /// Hex encoded fingerprint of the TNGL program on the device
    pub async fn get_tngl_fingerprint(&self) -> Result<String> {
        let body = self.request(command::TNGL_FINGERPRINT_REQUEST, &[]).await?;
        device::read_fingerprint(&body)
    }

    pub async fn get_connected_peers_info(&self) -> Result<Vec<PeerInfo>> {
        let body = self.request(command::CONNECTED_PEERS_INFO_REQUEST, &[]).await?;
        device::read_peers(&body)
    }

    /// Device configuration as a JSON string
    pub async fn read_device_config(&self) -> Result<String> {
        let body = self.request(command::DEVICE_CONFIG_REQUEST, &[]).await?;
        device::read_device_config(&body)
    }

    /// Replace the device configuration. `config` must be valid JSON.
    pub async fn update_device_config(&self, config: &str) -> Result<()> {
        serde_json::from_str::<serde_json::Value>(config).map_err(|e| {
            ClientError::InvalidArgument(format!("device config is not valid JSON: {e}"))
        })?;
        let body = device::config_update_body(config)?;
        self.request(command::CONFIG_UPDATE_REQUEST, &body).await?;
        Ok(())
    }

    /// Ask the device to reboot; it drops the connection without answering
    pub async fn reboot_device(&self) -> Result<()> {
        let payload = encode_request(command::DEVICE_REBOOT_REQUEST, rand::random(), &[])?;
        self.interface
            .request(payload, false, self.interface.config().default_timeout())
            .await?;
        Ok(())
    }

    /// Adopt the selected device into the configured owner's network
    pub async fn adopt(&self, name: &str) -> Result<AdoptedDevice> {
        let _adopting = InProgress::begin(&self.adopting, ClientError::AdoptingInProgress)?;
        let config = self.interface.config();

        let not_configured =
            |field: &str| ClientError::InvalidArgument(format!("{field} not configured"));
        let signature = config
            .owner_signature
            .as_deref()
            .ok_or_else(|| not_configured("owner signature"))?;
        let key = config
            .owner_key
            .as_deref()
            .ok_or_else(|| not_configured("owner key"))?;

        let signature = device::parse_owner_field("owner_signature", signature)?;
        let key = device::parse_owner_field("owner_key", key)?;
        let body = device::adopt_body(&signature, &key, name)?;

        let response = self.request(command::ADOPT_REQUEST, &body).await?;
        let adopted = device::read_adopted(&response)?;
        info!("adopted {} as {:?}", adopted.mac, adopted.name);
        Ok(adopted)
    }

    // ========================================================================
    // Firmware and teardown
    // ========================================================================

    /// Flash `firmware`. Progress arrives as [`SpectodaEvent::OtaStatus`] and
    /// [`SpectodaEvent::OtaProgress`]. On failure the connection is dropped.
    pub async fn update_device_firmware(&self, firmware: Bytes) -> Result<()> {
        info!("updating firmware ({} bytes)", firmware.len());
        let result = self.interface.update_fw(firmware).await;

        if let Err(e) = &result {
            warn!("firmware update failed: {}", e);
            if let Err(e) = self.interface.disconnect().await {
                warn!("disconnect after failed update: {}", e);
            }
        }
        result
    }

    /// Tear down and unassign the connector
    pub async fn destroy(&self) -> Result<()> {
        self.interface.destroy_connector().await
    }
}
