//! Client builder pattern

use spectoda_connector::{ConnectorFactory, ConnectorKind};
use std::time::Duration;

use crate::config::ClientConfig;
use crate::{Result, Spectoda};

/// Builder for [`Spectoda`]
pub struct SpectodaBuilder {
    config: ClientConfig,
    factories: Vec<(ConnectorKind, ConnectorFactory)>,
}

impl Default for SpectodaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectodaBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            factories: Vec::new(),
        }
    }

    /// Start from a complete configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Connector kind assigned by [`connect`](Self::connect)
    pub fn connector(mut self, kind: &str) -> Self {
        self.config.connector = kind.to_string();
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn timeout_margin(mut self, margin: Duration) -> Self {
        self.config.timeout_margin_ms = margin.as_millis() as u64;
        self
    }

    /// Largest combined payload of one execute delivery
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn drain_delay(mut self, delay: Duration) -> Self {
        self.config.drain_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn scan_duration(mut self, duration: Duration) -> Self {
        self.config.scan_duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn firmware_update_timeout(mut self, timeout: Duration) -> Self {
        self.config.firmware_update_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Owner credentials used by adoption, 32 hex characters each
    pub fn owner(mut self, signature: &str, key: &str) -> Self {
        self.config.owner_signature = Some(signature.to_string());
        self.config.owner_key = Some(key.to_string());
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Provide a transport for `kind`
    pub fn register_connector(mut self, kind: ConnectorKind, factory: ConnectorFactory) -> Self {
        self.factories.push((kind, factory));
        self
    }

    /// Build without assigning a connector
    pub fn build(self) -> Spectoda {
        let spectoda = Spectoda::new(self.config);
        for (kind, factory) in self.factories {
            spectoda.register_connector(kind, factory);
        }
        spectoda
    }

    /// Build and assign the configured connector kind
    pub async fn connect(self) -> Result<Spectoda> {
        let kind = self.config.connector.clone();
        let spectoda = self.build();
        spectoda.assign_connector(&kind).await?;
        Ok(spectoda)
    }
}
