//! Spectoda Client Library
//!
//! Async client for Spectoda lighting controller networks.
//!
//! # Example
//!
//! ```ignore
//! use spectoda_client::Spectoda;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let spectoda = Spectoda::builder().connector("dummy").connect().await?;
//!
//!     let mut events = spectoda.subscribe();
//!     spectoda.connect().await?;
//!
//!     spectoda.write_tngl("setDrawing(0s, Infinity, animFill(5s, #ff0000));").await?;
//!     spectoda.emit_percentage("brigh", 75.0, 0xFF).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

mod command;
pub mod builder;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod interface;
pub mod spectoda;
pub mod state;

pub use builder::SpectodaBuilder;
pub use config::ClientConfig;
pub use device::{AdoptedDevice, PeerInfo};
pub use error::{ClientError, Result};
pub use event::SpectodaEvent;
pub use interface::{update_clock, Interface, SharedClock};
pub use spectoda::Spectoda;
pub use state::ConnectionState;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::SpectodaBuilder;
    pub use crate::config::ClientConfig;
    pub use crate::error::{ClientError, Result};
    pub use crate::event::SpectodaEvent;
    pub use crate::spectoda::Spectoda;
    pub use crate::state::ConnectionState;
    pub use spectoda_connector::{ConnectorKind, SelectionCriteria};
    pub use spectoda_core::{Color, EventRecord, EventValue, Label};
}
