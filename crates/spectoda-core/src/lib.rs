//! Spectoda Core
//!
//! Protocol primitives for Spectoda lighting controller networks.
//!
//! This crate provides:
//! - Binary codec over flat byte buffers ([`Reader`], [`Writer`])
//! - Pausable logical clock ([`TimeTrack`])
//! - TNGL tokenizer and compiler ([`TnglCompiler`], [`compile`])
//! - Outgoing command frames ([`frame`]) and the request envelope ([`request`])
//! - Inbound command stream decoding ([`Decoder`])

pub mod codec;
pub mod compiler;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod request;
pub mod time;
pub mod tokenizer;
pub mod types;

pub use codec::{Reader, Writer};
pub use compiler::{compile, TnglCompiler};
pub use decoder::{Decoded, Decoder, Record};
pub use error::{Error, Result};
pub use time::{Notifications, TimeTrack, TimeTrackEvent};
pub use types::*;

/// Largest payload a single transport write may carry, matching the smallest supported MTU
pub const MAX_CHUNK_SIZE: usize = 208;
