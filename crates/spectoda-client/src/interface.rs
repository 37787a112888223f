//! Command queue
//!
//! Every transport operation goes through one FIFO queue drained by a single
//! task, so there is never more than one call in flight against the assigned
//! connector. Enqueueing is synchronous; the returned future only waits for
//! the command's result, bounded by the operation timeout plus a safety
//! margin.
//!
//! Two kinds of commands coalesce while queued:
//! - an execute with a key replaces the queued execute with the same key,
//!   which resolves as a no-op
//! - a clock read rejects the previous one, queued or in flight, with
//!   [`ClientError::MultipleClockReads`]
//!
//! Consecutive executes at the head of the queue are packed into one
//! delivery of at most `chunk_size` bytes and share its outcome.

use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use spectoda_connector::{
    ConnectedInfo, Connector, ConnectorEvent, ConnectorEventReceiver, ConnectorEventSender,
    ConnectorFactory, DeviceInfo, SelectedInfo, SelectionCriteria,
};
use spectoda_core::{Decoder, Record, TimeTrack};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::command::{Command, Deferred};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::event::SpectodaEvent;
use crate::state::ConnectionState;

/// Shared handle to a [`TimeTrack`]
pub type SharedClock = Arc<Mutex<TimeTrack>>;

/// Mutate a shared clock, notifying its listeners after the lock is released
pub fn update_clock<R>(clock: &SharedClock, update: impl FnOnce(&mut TimeTrack) -> R) -> R {
    let (result, notifications) = clock.lock().batch(update);
    notifications.fire();
    result
}

struct Queue {
    commands: VecDeque<Command>,
    draining: bool,
    /// Clock read currently queued or in flight
    clock_read: Option<Deferred<u64>>,
}

struct Slot {
    connector: Arc<dyn Connector>,
    pump: JoinHandle<()>,
}

struct Shared {
    config: ClientConfig,
    queue: Mutex<Queue>,
    slot: RwLock<Option<Slot>>,
    /// Network clock, written only from the drain loop
    clock: SharedClock,
    timeline: SharedClock,
    decoder: Mutex<Decoder>,
    state: Mutex<ConnectionState>,
    disconnect_waiters: Mutex<Vec<oneshot::Sender<()>>>,
    events: broadcast::Sender<SpectodaEvent>,
}

/// Caller side of a queued command
struct Pending<T> {
    name: &'static str,
    guard: Duration,
    done: Deferred<T>,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    async fn wait(self) -> Result<T> {
        match tokio::time::timeout(self.guard, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::InterfaceClosed),
            Err(_) => {
                let reason = format!("{} did not settle within {:?}", self.name, self.guard);
                warn!("{}", reason);
                // A late completion from the connector is ignored from here on
                self.done.reject(ClientError::Timeout(reason.clone()));
                Err(ClientError::Timeout(reason))
            }
        }
    }
}

async fn wait_checked<T>(pending: Result<Pending<T>>) -> Result<T> {
    pending?.wait().await
}

fn check_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        Err(ClientError::InvalidTimeout)
    } else {
        Ok(())
    }
}

/// The serializing command queue bound to at most one connector
#[derive(Clone)]
pub struct Interface {
    shared: Arc<Shared>,
}

impl Interface {
    pub fn new(config: ClientConfig, events: broadcast::Sender<SpectodaEvent>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                queue: Mutex::new(Queue {
                    commands: VecDeque::new(),
                    draining: false,
                    clock_read: None,
                }),
                slot: RwLock::new(None),
                clock: Arc::new(Mutex::new(TimeTrack::new(0, false))),
                timeline: Arc::new(Mutex::new(TimeTrack::new(0, true))),
                decoder: Mutex::new(Decoder::new()),
                state: Mutex::new(ConnectionState::Disconnected),
                disconnect_waiters: Mutex::new(Vec::new()),
                events,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Network clock
    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.shared.clock)
    }

    /// Current network clock reading, clamped to the wire range
    pub fn clock_millis(&self) -> u64 {
        self.shared.clock.lock().millis().max(0) as u64
    }

    /// Application timeline
    pub fn timeline(&self) -> SharedClock {
        Arc::clone(&self.shared.timeline)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Kind of the assigned connector
    pub fn connector_kind(&self) -> Option<String> {
        self.shared.connector().map(|c| c.kind().to_string())
    }

    /// Commands waiting to be dispatched
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().commands.len()
    }

    // ========================================================================
    // Connector slot
    // ========================================================================

    /// Build a connector wired to this queue and assign it
    pub fn attach<C, F>(&self, build: F) -> Arc<C>
    where
        C: Connector + 'static,
        F: FnOnce(ConnectorEventSender) -> C,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(build(tx));
        self.shared.install(Arc::clone(&connector) as Arc<dyn Connector>, rx);
        connector
    }

    /// Assign a connector produced by a registered factory
    pub fn attach_factory(&self, factory: &ConnectorFactory) -> Arc<dyn Connector> {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = factory(tx);
        self.shared.install(Arc::clone(&connector), rx);
        connector
    }

    pub fn has_connector(&self) -> bool {
        self.shared.slot.read().is_some()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn submit<T>(
        &self,
        name: &'static str,
        guard: Duration,
        build: impl FnOnce(Deferred<T>) -> Command,
    ) -> Pending<T> {
        let (done, rx) = Deferred::new();
        self.shared.enqueue(build(done.clone()));
        Pending { name, guard, done, rx }
    }

    fn guard(&self, timeout: Duration) -> Duration {
        self.shared.config.guard(timeout)
    }

    /// Queue bytecode for delivery. Executes with the same `key` coalesce
    /// while queued, keeping only the newest.
    pub fn execute(
        &self,
        payload: Bytes,
        key: Option<String>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let guard = self.guard(self.shared.config.default_timeout());
        self.submit("execute", guard, |done| Command::Execute { payload, key, done })
            .wait()
    }

    pub fn deliver(
        &self,
        payload: Bytes,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let pending = check_timeout(timeout).map(|()| {
            self.submit("deliver", self.guard(timeout), |done| Command::Deliver {
                payload,
                timeout,
                done,
            })
        });
        wait_checked(pending)
    }

    pub fn transmit(
        &self,
        payload: Bytes,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let pending = check_timeout(timeout).map(|()| {
            self.submit("transmit", self.guard(timeout), |done| Command::Transmit {
                payload,
                timeout,
                done,
            })
        });
        wait_checked(pending)
    }

    pub fn user_select(
        &self,
        criteria: Vec<SelectionCriteria>,
        timeout: Duration,
    ) -> impl Future<Output = Result<SelectedInfo>> + Send + 'static {
        let pending = check_timeout(timeout).map(|()| {
            self.submit("user_select", self.guard(timeout), |done| Command::UserSelect {
                criteria,
                timeout,
                done,
            })
        });
        wait_checked(pending)
    }

    pub fn auto_select(
        &self,
        criteria: Vec<SelectionCriteria>,
        scan_duration: Duration,
        timeout: Duration,
    ) -> impl Future<Output = Result<SelectedInfo>> + Send + 'static {
        let pending = check_timeout(timeout).map(|()| {
            let guard = self.guard(scan_duration + timeout);
            self.submit("auto_select", guard, |done| Command::AutoSelect {
                criteria,
                scan_duration,
                timeout,
                done,
            })
        });
        wait_checked(pending)
    }

    pub fn selected(&self) -> impl Future<Output = Result<Option<SelectedInfo>>> + Send + 'static {
        let guard = self.guard(self.shared.config.default_timeout());
        self.submit("selected", guard, |done| Command::Selected { done }).wait()
    }

    pub fn unselect(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let guard = self.guard(self.shared.config.default_timeout());
        self.submit("unselect", guard, |done| Command::Unselect { done }).wait()
    }

    pub fn scan(
        &self,
        criteria: Vec<SelectionCriteria>,
        scan_duration: Duration,
    ) -> impl Future<Output = Result<Vec<DeviceInfo>>> + Send + 'static {
        let guard = self.guard(scan_duration);
        self.submit("scan", guard, |done| Command::Scan {
            criteria,
            scan_duration,
            done,
        })
        .wait()
    }

    pub fn connect(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<ConnectedInfo>> + Send + 'static {
        // connect also reads the clock before settling
        let pending = check_timeout(timeout).map(|()| {
            let guard = self.guard(timeout + self.shared.config.default_timeout());
            self.submit("connect", guard, |done| Command::Connect { timeout, done })
        });
        wait_checked(pending)
    }

    pub fn connected(
        &self,
    ) -> impl Future<Output = Result<Option<ConnectedInfo>>> + Send + 'static {
        let guard = self.guard(self.shared.config.default_timeout());
        self.submit("connected", guard, |done| Command::Connected { done }).wait()
    }

    /// Disconnect and wait for the connector to confirm the teardown
    pub fn disconnect(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let timeout = self.shared.config.default_timeout();
        let guard = self.guard(timeout + timeout);
        self.submit("disconnect", guard, |done| Command::Disconnect { done }).wait()
    }

    pub fn request(
        &self,
        payload: Bytes,
        read_response: bool,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<Bytes>>> + Send + 'static {
        let pending = check_timeout(timeout).map(|()| {
            self.submit("request", self.guard(timeout), |done| Command::Request {
                payload,
                read_response,
                timeout,
                done,
            })
        });
        wait_checked(pending)
    }

    pub fn set_clock(&self, clock: u64) -> impl Future<Output = Result<()>> + Send + 'static {
        let guard = self.guard(self.shared.config.default_timeout());
        self.submit("set_clock", guard, |done| Command::SetClock { clock, done }).wait()
    }

    /// Read the device clock and apply it to the network clock
    pub fn get_clock(&self) -> impl Future<Output = Result<u64>> + Send + 'static {
        let guard = self.guard(self.shared.config.default_timeout());
        self.submit("get_clock", guard, |done| Command::GetClock { done }).wait()
    }

    pub fn update_fw(&self, firmware: Bytes) -> impl Future<Output = Result<()>> + Send + 'static {
        let guard = self.guard(self.shared.config.firmware_update_timeout());
        self.submit("firmware_update", guard, |done| Command::FirmwareUpdate { firmware, done })
            .wait()
    }

    /// Tear down and unassign the connector
    pub fn destroy_connector(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let guard = self.guard(self.shared.config.default_timeout());
        self.submit("destroy_connector", guard, |done| Command::DestroyConnector { done })
            .wait()
    }

    /// Feed inbound bytes to the decoder as if a connector had received them
    pub fn consume(&self, bytes: &[u8]) {
        self.shared.consume(bytes);
    }
}

impl Shared {
    fn connector(&self) -> Option<Arc<dyn Connector>> {
        self.slot.read().as_ref().map(|slot| Arc::clone(&slot.connector))
    }

    fn install(self: &Arc<Self>, connector: Arc<dyn Connector>, events: ConnectorEventReceiver) {
        let pump = tokio::spawn(pump(Arc::downgrade(self), events));
        info!("assigned {} connector", connector.kind());

        let previous = self.slot.write().replace(Slot { connector, pump });
        if let Some(previous) = previous {
            warn!("{} connector replaced without teardown", previous.connector.kind());
            previous.pump.abort();
        }
    }

    fn detach(&self) {
        if let Some(slot) = self.slot.write().take() {
            info!("unassigned {} connector", slot.connector.kind());
            slot.pump.abort();
        }
    }

    // ========================================================================
    // Queue
    // ========================================================================

    fn enqueue(self: &Arc<Self>, command: Command) {
        let start_drain = {
            let mut queue = self.queue.lock();

            match &command {
                Command::Execute { key: Some(key), .. } => {
                    let existing = queue.commands.iter().position(|queued| {
                        matches!(queued, Command::Execute { key: Some(k), .. } if k == key)
                    });
                    let removed = existing.and_then(|i| queue.commands.remove(i));
                    if let Some(Command::Execute { done, .. }) = removed {
                        debug!("execute {:?} superseded", key);
                        done.resolve(());
                    }
                }
                Command::GetClock { done } => {
                    if let Some(previous) = queue.clock_read.replace(done.clone()) {
                        queue.commands.retain(|queued| {
                            !matches!(queued, Command::GetClock { done } if done.same_as(&previous))
                        });
                        if previous.reject(ClientError::MultipleClockReads) {
                            debug!("previous clock read superseded");
                        }
                    }
                }
                _ => {}
            }

            queue.commands.push_back(command);
            !std::mem::replace(&mut queue.draining, true)
        };

        if start_drain {
            let shared = Arc::clone(self);
            tokio::spawn(async move { shared.drain().await });
        }
    }

    async fn drain(self: Arc<Self>) {
        // let a burst of commands issued together land before the first dispatch
        tokio::time::sleep(self.config.drain_delay()).await;

        loop {
            let command = {
                let mut queue = self.queue.lock();
                match queue.commands.pop_front() {
                    Some(command) => command,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };

            let name = command.name();
            if AssertUnwindSafe(self.dispatch(command)).catch_unwind().await.is_err() {
                error!("{} dispatch panicked", name);
            }
        }
    }

    async fn dispatch(&self, command: Command) {
        let Some(connector) = self.connector() else {
            match command {
                Command::DestroyConnector { done } => {
                    done.resolve(());
                }
                other => {
                    warn!("{} rejected: no connector assigned", other.name());
                    other.reject(ClientError::ConnectorNotAssigned);
                }
            }
            return;
        };

        debug!("dispatching {} on {} connector", command.name(), connector.kind());

        match command {
            Command::Execute { payload, done, .. } => {
                self.dispatch_execute(&connector, payload, done).await
            }
            Command::Deliver { payload, timeout, done } => {
                done.settle(connector.deliver(payload, timeout).await.map_err(Into::into));
            }
            Command::Transmit { payload, timeout, done } => {
                done.settle(connector.transmit(payload, timeout).await.map_err(Into::into));
            }
            Command::UserSelect { criteria, timeout, done } => {
                done.settle(connector.user_select(&criteria, timeout).await.map_err(Into::into));
            }
            Command::AutoSelect {
                criteria,
                scan_duration,
                timeout,
                done,
            } => {
                let result = connector.auto_select(&criteria, scan_duration, timeout).await;
                done.settle(result.map_err(Into::into));
            }
            Command::Selected { done } => {
                done.settle(connector.selected().await.map_err(Into::into));
            }
            Command::Unselect { done } => {
                done.settle(connector.unselect().await.map_err(Into::into));
            }
            Command::Scan {
                criteria,
                scan_duration,
                done,
            } => {
                done.settle(connector.scan(&criteria, scan_duration).await.map_err(Into::into));
            }
            Command::Connect { timeout, done } => {
                self.dispatch_connect(&connector, timeout, done).await
            }
            Command::Connected { done } => {
                done.settle(connector.connected().await.map_err(Into::into));
            }
            Command::Disconnect { done } => self.dispatch_disconnect(&connector, done).await,
            Command::Request {
                payload,
                read_response,
                timeout,
                done,
            } => {
                let result = connector.request(payload, read_response, timeout).await;
                done.settle(result.map_err(Into::into));
            }
            Command::SetClock { clock, done } => {
                done.settle(connector.set_clock(clock).await.map_err(Into::into));
            }
            Command::GetClock { done } => self.dispatch_get_clock(&connector, done).await,
            Command::FirmwareUpdate { firmware, done } => {
                done.settle(connector.update_fw(firmware).await.map_err(Into::into));
            }
            Command::DestroyConnector { done } => {
                if let Err(e) = connector.destroy().await {
                    warn!("{} connector teardown failed: {}", connector.kind(), e);
                }
                self.detach();
                self.on_disconnected();
                done.resolve(());
            }
        }
    }

    async fn dispatch_execute(
        &self,
        connector: &Arc<dyn Connector>,
        payload: Bytes,
        done: Deferred<()>,
    ) {
        let chunk_size = self.config.chunk_size;
        let mut batch = BytesMut::from(payload.as_ref());
        let mut handles = vec![done];

        {
            let mut queue = self.queue.lock();
            loop {
                let fits = match queue.commands.front() {
                    Some(Command::Execute { payload, .. }) => {
                        batch.len() + payload.len() <= chunk_size
                    }
                    _ => false,
                };
                if !fits {
                    break;
                }
                if let Some(Command::Execute { payload, done, .. }) = queue.commands.pop_front() {
                    batch.extend_from_slice(&payload);
                    handles.push(done);
                }
            }
        }

        let payload = batch.freeze();
        debug!("delivering {} bytes for {} execute(s)", payload.len(), handles.len());

        let result = connector
            .deliver(payload.clone(), self.config.default_timeout())
            .await
            .map_err(ClientError::from);

        match &result {
            Ok(()) => self.consume(&payload),
            Err(e) => warn!("execute delivery failed: {}", e),
        }
        for handle in handles {
            handle.settle(result.clone());
        }
    }

    async fn dispatch_connect(
        &self,
        connector: &Arc<dyn Connector>,
        timeout: Duration,
        done: Deferred<ConnectedInfo>,
    ) {
        self.set_state(ConnectionState::Connecting);

        match connector.connect(timeout).await {
            Ok(info) => {
                // the connector's own notification may not have arrived yet
                self.on_connected();

                match connector.get_clock().await {
                    Ok(clock) => {
                        update_clock(&self.clock, |track| track.set_millis(clock as i64));
                        debug!("network clock set to {}", clock);
                    }
                    Err(e) => {
                        warn!("clock read after connect failed: {}", e);
                        update_clock(&self.clock, |track| track.set_millis(0));
                    }
                }

                info!("connected to {}", info.name);
                done.resolve(info);
            }
            Err(e) => {
                warn!("connect failed: {}", e);
                if let Err(e) = connector.disconnect().await {
                    warn!("cleanup disconnect failed: {}", e);
                }
                self.set_state(ConnectionState::Disconnected);
                done.reject(e.into());
            }
        }
    }

    async fn dispatch_disconnect(&self, connector: &Arc<dyn Connector>, done: Deferred<()>) {
        if self.current_state() == ConnectionState::Disconnected {
            if let Err(e) = connector.disconnect().await {
                warn!("disconnect failed: {}", e);
            }
            done.resolve(());
            return;
        }

        let (tx, rx) = oneshot::channel();
        self.disconnect_waiters.lock().push(tx);
        self.set_state(ConnectionState::Disconnecting);

        if let Err(e) = connector.disconnect().await {
            warn!("disconnect failed: {}", e);
        }

        if tokio::time::timeout(self.config.default_timeout(), rx).await.is_err() {
            warn!("{} connector never confirmed the disconnect", connector.kind());
        }
        self.on_disconnected();
        done.resolve(());
    }

    async fn dispatch_get_clock(&self, connector: &Arc<dyn Connector>, done: Deferred<u64>) {
        let result = connector.get_clock().await;

        {
            let mut queue = self.queue.lock();
            if queue.clock_read.as_ref().is_some_and(|current| current.same_as(&done)) {
                queue.clock_read = None;
            }
        }

        match result {
            Ok(clock) => {
                // a superseded read must not overwrite the newer one
                if !done.is_settled() {
                    update_clock(&self.clock, |track| track.set_millis(clock as i64));
                }
                done.resolve(clock);
            }
            Err(e) => {
                done.reject(e.into());
            }
        }
    }

    // ========================================================================
    // Connector notifications
    // ========================================================================

    fn on_connector_event(&self, event: ConnectorEvent) {
        match event {
            ConnectorEvent::Connected => {
                if self.current_state() == ConnectionState::Disconnecting {
                    debug!("stale connected notification ignored");
                } else {
                    self.on_connected();
                }
            }
            ConnectorEvent::Disconnected => self.on_disconnected(),
            ConnectorEvent::Data(bytes) => self.consume(&bytes),
            ConnectorEvent::OtaStatus(status) => self.emit(SpectodaEvent::OtaStatus(status)),
            ConnectorEvent::OtaProgress(percent) => self.emit(SpectodaEvent::OtaProgress(percent)),
        }
    }

    fn on_connected(&self) {
        self.set_state(ConnectionState::Connected);
    }

    fn on_disconnected(&self) {
        self.set_state(ConnectionState::Disconnected);
        self.decoder.lock().clear_peers();
        for waiter in self.disconnect_waiters.lock().drain(..) {
            let _ = waiter.send(());
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `next`, notifying only on an actual change
    fn set_state(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if *state == next {
            return false;
        }
        info!("connection {} -> {}", *state, next);
        *state = next;
        self.emit(SpectodaEvent::StateChanged(next));
        true
    }

    fn emit(&self, event: SpectodaEvent) {
        // no subscribers is not an error
        let _ = self.events.send(event);
    }

    fn consume(&self, bytes: &[u8]) {
        let network_millis = self.clock.lock().millis();
        let decoded = self.decoder.lock().decode(bytes, network_millis);

        for record in decoded.records {
            match record {
                Record::Timeline(timeline) => {
                    self.timeline.lock().set_state_silent(timeline.millis, timeline.paused);
                    self.emit(SpectodaEvent::TimelineUpdated(timeline));
                }
                Record::PeerConnected(mac) => self.emit(SpectodaEvent::PeerConnected(mac)),
                Record::PeerDisconnected(mac) => self.emit(SpectodaEvent::PeerDisconnected(mac)),
                Record::TnglBytes {
                    clock_timestamp,
                    bytecode,
                } => self.emit(SpectodaEvent::TnglUpdated {
                    clock_timestamp,
                    size: bytecode.len(),
                }),
            }
        }

        if !decoded.events.is_empty() {
            debug!("decoded {} event(s)", decoded.events.len());
            self.emit(SpectodaEvent::Events(decoded.events));
        }
    }
}

async fn pump(shared: Weak<Shared>, mut events: ConnectorEventReceiver) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.on_connector_event(event);
    }
}
