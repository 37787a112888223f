//! Spectoda Connector
//!
//! The capability contract every transport adapter implements, plus the
//! in-memory [`DummyConnector`] used for development and tests.
//!
//! Concrete Bluetooth, serial, mobile bridge and WebSocket adapters live
//! outside this crate and plug in through [`ConnectorFactory`].

pub mod criteria;
pub mod dummy;
pub mod error;
pub mod kind;
pub mod traits;

pub use criteria::{matches_any, ConnectedInfo, DeviceInfo, SelectedInfo, SelectionCriteria};
pub use dummy::{DummyConfig, DummyConnector};
pub use error::{ConnectorError, Result};
pub use kind::ConnectorKind;
pub use traits::{
    Connector, ConnectorEvent, ConnectorEventReceiver, ConnectorEventSender, ConnectorFactory,
    OtaStatus,
};
