//! Common test helpers for the Spectoda crates
//!
//! - Condition-based waiting (no hardcoded sleeps)
//! - An event collector draining a broadcast channel
//! - [`RecordingConnector`], a connector that records every payload it is
//!   handed and fails on demand

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use spectoda_connector::{
    ConnectedInfo, Connector, ConnectorError, ConnectorEvent, ConnectorEventSender, DeviceInfo,
    OtaStatus, Result, SelectedInfo, SelectionCriteria,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout. Uses tokio's clock, so it also works
/// under a paused test runtime.
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_for(
        || async { counter.load(Ordering::SeqCst) >= target },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

// ============================================================================
// Event Collector
// ============================================================================

/// Drains a broadcast receiver in the background and keeps everything it saw
pub struct EventCollector<T> {
    events: Arc<Mutex<Vec<T>>>,
    count: Arc<AtomicU32>,
    task: JoinHandle<()>,
}

impl<T: Clone + Send + 'static> EventCollector<T> {
    pub fn spawn(mut receiver: broadcast::Receiver<T>) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let count = Arc::new(AtomicU32::new(0));

        let task = {
            let events = events.clone();
            let count = count.clone();
            tokio::spawn(async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) => {
                            events.lock().push(event);
                            count.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };

        Self { events, count, task }
    }

    /// Get the count of received events
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait for at least n events to be received
    pub async fn wait_for_count(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.count, n, max_wait).await
    }

    /// Wait until an event matching `predicate` arrives, returning it
    pub async fn wait_for_event<P>(&self, predicate: P, max_wait: Duration) -> Option<T>
    where
        P: Fn(&T) -> bool,
    {
        let found = wait_for(
            || async { self.events.lock().iter().any(&predicate) },
            DEFAULT_CHECK_INTERVAL,
            max_wait,
        )
        .await;
        if found {
            self.events.lock().iter().find(|e| predicate(e)).cloned()
        } else {
            None
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<T> {
        self.events.lock().clone()
    }

    /// Collected events matching `predicate`
    pub fn matching<P>(&self, predicate: P) -> Vec<T>
    where
        P: Fn(&T) -> bool,
    {
        self.events.lock().iter().filter(|e| predicate(e)).cloned().collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
        self.count.store(0, Ordering::SeqCst);
    }
}

impl<T> Drop for EventCollector<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// Recording Connector
// ============================================================================

/// Builds the response to a request payload
pub type Responder = Arc<dyn Fn(&[u8]) -> Option<Bytes> + Send + Sync>;

/// Behaviour switches of a [`RecordingConnector`]
#[derive(Clone, Default)]
pub struct RecordingOptions {
    /// Delay applied to connect, deliver and clock reads
    pub latency: Duration,
    pub fail_connect: bool,
    pub fail_deliver: bool,
    pub fail_clock: bool,
    /// Emit connected/disconnected notifications like a real transport
    pub announce: bool,
    pub responder: Option<Responder>,
}

/// Connector double that records payloads instead of sending them
pub struct RecordingConnector {
    events: ConnectorEventSender,
    options: Mutex<RecordingOptions>,
    selected: Mutex<Option<SelectedInfo>>,
    connected: AtomicBool,
    delivered: Mutex<Vec<Bytes>>,
    transmitted: Mutex<Vec<Bytes>>,
    requests: Mutex<Vec<Bytes>>,
    clock: AtomicU64,
    clock_reads: AtomicU32,
    disconnects: AtomicU32,
    destroyed: AtomicBool,
}

impl RecordingConnector {
    pub const KIND: &'static str = "recording";

    pub fn new(events: ConnectorEventSender) -> Self {
        Self::with_options(
            events,
            RecordingOptions {
                announce: true,
                ..Default::default()
            },
        )
    }

    pub fn with_options(events: ConnectorEventSender, options: RecordingOptions) -> Self {
        Self {
            events,
            options: Mutex::new(options),
            selected: Mutex::new(None),
            connected: AtomicBool::new(false),
            delivered: Mutex::new(Vec::new()),
            transmitted: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            clock: AtomicU64::new(0),
            clock_reads: AtomicU32::new(0),
            disconnects: AtomicU32::new(0),
            destroyed: AtomicBool::new(false),
        }
    }

    fn options(&self) -> RecordingOptions {
        self.options.lock().clone()
    }

    /// Change behaviour switches at runtime
    pub fn configure(&self, update: impl FnOnce(&mut RecordingOptions)) {
        update(&mut self.options.lock());
    }

    /// Payloads handed to `deliver`, in call order
    pub fn delivered(&self) -> Vec<Bytes> {
        self.delivered.lock().clone()
    }

    pub fn transmitted(&self) -> Vec<Bytes> {
        self.transmitted.lock().clone()
    }

    pub fn requests(&self) -> Vec<Bytes> {
        self.requests.lock().clone()
    }

    pub fn clock_reads(&self) -> u32 {
        self.clock_reads.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Value returned by the next clock reads
    pub fn set_device_clock(&self, clock: u64) {
        self.clock.store(clock, Ordering::SeqCst);
    }

    pub fn device_clock(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    /// Push a notification as if the transport produced it
    pub fn emit(&self, event: ConnectorEvent) {
        let _ = self.events.send(event);
    }

    fn info(&self) -> SelectedInfo {
        SelectedInfo {
            connector: Self::KIND.to_string(),
            name: "recorder".to_string(),
            mac: None,
        }
    }

    async fn delay(&self) {
        let latency = self.options().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    fn kind(&self) -> &str {
        Self::KIND
    }

    async fn user_select(
        &self,
        _criteria: &[SelectionCriteria],
        _timeout: Duration,
    ) -> Result<SelectedInfo> {
        let info = self.info();
        *self.selected.lock() = Some(info.clone());
        Ok(info)
    }

    async fn auto_select(
        &self,
        criteria: &[SelectionCriteria],
        _scan_duration: Duration,
        timeout: Duration,
    ) -> Result<SelectedInfo> {
        self.user_select(criteria, timeout).await
    }

    async fn selected(&self) -> Result<Option<SelectedInfo>> {
        Ok(self.selected.lock().clone())
    }

    async fn unselect(&self) -> Result<()> {
        self.selected.lock().take();
        Ok(())
    }

    async fn scan(
        &self,
        _criteria: &[SelectionCriteria],
        _scan_duration: Duration,
    ) -> Result<Vec<DeviceInfo>> {
        Ok(vec![DeviceInfo {
            name: "recorder".to_string(),
            ..Default::default()
        }])
    }

    async fn connect(&self, _timeout: Duration) -> Result<ConnectedInfo> {
        self.delay().await;
        let options = self.options();
        if options.fail_connect {
            return Err(ConnectorError::ConnectionFailed("refused by test".to_string()));
        }
        if !self.connected.swap(true, Ordering::SeqCst) && options.announce {
            self.emit(ConnectorEvent::Connected);
        }
        Ok(self.info().into())
    }

    async fn connected(&self) -> Result<Option<ConnectedInfo>> {
        Ok(self.connected.load(Ordering::SeqCst).then(|| self.info().into()))
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.connected.swap(false, Ordering::SeqCst) && self.options().announce {
            self.emit(ConnectorEvent::Disconnected);
        }
        Ok(())
    }

    async fn deliver(&self, payload: Bytes, _timeout: Duration) -> Result<()> {
        self.delay().await;
        self.delivered.lock().push(payload);
        if self.options().fail_deliver {
            return Err(ConnectorError::DeliverFailed("refused by test".to_string()));
        }
        Ok(())
    }

    async fn transmit(&self, payload: Bytes, _timeout: Duration) -> Result<()> {
        self.transmitted.lock().push(payload);
        Ok(())
    }

    async fn request(
        &self,
        payload: Bytes,
        read_response: bool,
        _timeout: Duration,
    ) -> Result<Option<Bytes>> {
        self.requests.lock().push(payload.clone());
        if !read_response {
            return Ok(None);
        }
        let responder = self
            .options()
            .responder
            .ok_or_else(|| ConnectorError::RequestFailed("no responder".to_string()))?;
        responder(&payload)
            .map(Some)
            .ok_or_else(|| ConnectorError::RequestFailed("request not answered".to_string()))
    }

    async fn set_clock(&self, clock: u64) -> Result<()> {
        if self.options().fail_clock {
            return Err(ConnectorError::ClockWriteFailed);
        }
        self.clock.store(clock, Ordering::SeqCst);
        Ok(())
    }

    async fn get_clock(&self) -> Result<u64> {
        self.clock_reads.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.options().fail_clock {
            return Err(ConnectorError::ClockReadFailed);
        }
        Ok(self.clock.load(Ordering::SeqCst))
    }

    async fn update_fw(&self, firmware: Bytes) -> Result<()> {
        self.emit(ConnectorEvent::OtaStatus(OtaStatus::Begin));
        if firmware.is_empty() {
            self.emit(ConnectorEvent::OtaStatus(OtaStatus::Fail));
            return Err(ConnectorError::UpdateFailed("empty firmware".to_string()));
        }
        self.emit(ConnectorEvent::OtaProgress(100));
        self.emit(ConnectorEvent::OtaStatus(OtaStatus::Success));
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.destroyed.store(true, Ordering::SeqCst);
        self.disconnect().await
    }
}
