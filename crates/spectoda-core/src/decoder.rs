//! Inbound command stream decoder
//!
//! Parses a buffer of concatenated frames into protocol records. The decoder
//! never fails: an unknown tag or a truncated frame discards the rest of the
//! buffer, since the stream cannot be resynchronized past it.
//!
//! Events are returned in reverse discovery order, most recently parsed
//! first, so consumers resolving "last event wins" see the winner first.

use std::collections::HashSet;
use tracing::{debug, error};

use crate::codec::Reader;
use crate::constants::command;
use crate::types::{raw_to_percentage, Color, EventRecord, EventValue, Mac, TimelineState};
use crate::Result;

/// Non-event record found in a buffer, in discovery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Remote timeline state
    Timeline(TimelineState),
    /// A peer joined the network
    PeerConnected(Mac),
    /// A peer left the network
    PeerDisconnected(Mac),
    /// TNGL bytecode upload
    TnglBytes { clock_timestamp: u64, bytecode: Vec<u8> },
}

/// Part of a buffer that was thrown away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discarded {
    /// Tag that could not be parsed
    pub tag: u8,
    /// Offset of that tag
    pub offset: usize,
    /// Number of bytes dropped, the tag included
    pub bytes: usize,
}

/// Result of decoding one buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub records: Vec<Record>,
    /// Most recently parsed first
    pub events: Vec<EventRecord>,
    pub discarded: Option<Discarded>,
}

/// Stateful decoder tracking which peers are connected
#[derive(Debug, Default)]
pub struct Decoder {
    connected_peers: HashSet<Mac>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peers currently known to be connected
    pub fn connected_peers(&self) -> impl Iterator<Item = &Mac> {
        self.connected_peers.iter()
    }

    /// Forget all connected peers
    pub fn clear_peers(&mut self) {
        self.connected_peers.clear();
    }

    /// Decode `bytes`. `network_millis` is the current network clock, used
    /// to carry a running timeline forward to now.
    pub fn decode(&mut self, bytes: &[u8], network_millis: i64) -> Decoded {
        let mut reader = Reader::new(bytes);
        let mut decoded = Decoded::default();

        while reader.available() > 0 {
            let offset = reader.position();
            let tag = match reader.peek_flag() {
                Ok(tag) => tag,
                Err(_) => break,
            };

            let outcome = match tag {
                command::SET_TIMELINE => read_timeline(&mut reader, network_millis)
                    .map(|t| decoded.records.push(Record::Timeline(t))),
                command::EMIT_EVENT
                | command::EMIT_TIMESTAMP_EVENT
                | command::EMIT_COLOR_EVENT
                | command::EMIT_PERCENTAGE_EVENT
                | command::EMIT_LABEL_EVENT => {
                    read_event(&mut reader).map(|e| decoded.events.push(e))
                }
                command::PEER_CONNECTED => read_peer(&mut reader).map(|mac| {
                    if self.connected_peers.insert(mac) {
                        decoded.records.push(Record::PeerConnected(mac));
                    }
                }),
                command::PEER_DISCONNECTED => read_peer(&mut reader).map(|mac| {
                    if self.connected_peers.remove(&mac) {
                        decoded.records.push(Record::PeerDisconnected(mac));
                    }
                }),
                command::TNGL_BYTES => {
                    read_tngl_bytes(&mut reader).map(|r| decoded.records.push(r))
                }
                command::OTA_BEGIN | command::OTA_WRITE | command::OTA_END | command::OTA_RESET => {
                    skip_ota(&mut reader)
                }
                unknown => {
                    error!(
                        "unknown command tag {} at offset {}, discarding {} bytes",
                        unknown,
                        offset,
                        reader.available()
                    );
                    decoded.discarded = Some(discard(&mut reader, unknown, offset));
                    break;
                }
            };

            if let Err(e) = outcome {
                error!("malformed frame with tag {} at offset {}: {}", tag, offset, e);
                reader.back(reader.position() - offset);
                decoded.discarded = Some(discard(&mut reader, tag, offset));
                break;
            }
        }

        decoded.events.reverse();
        decoded
    }
}

fn discard(reader: &mut Reader<'_>, tag: u8, offset: usize) -> Discarded {
    let bytes = reader.available();
    reader.forward(bytes);
    Discarded { tag, offset, bytes }
}

fn read_timeline(reader: &mut Reader<'_>, network_millis: i64) -> Result<TimelineState> {
    reader.read_u8()?;
    let clock_timestamp = reader.read_u48()?;
    let timeline_millis = i64::from(reader.read_i32()?);
    let flags = reader.read_u8()?;
    let paused = flags & command::TIMELINE_PAUSED_BIT != 0;

    let millis = if paused {
        timeline_millis
    } else {
        timeline_millis + (network_millis - clock_timestamp as i64)
    };

    debug!("timeline frame: {} ms (paused: {})", millis, paused);
    Ok(TimelineState {
        clock_timestamp,
        millis,
        paused,
    })
}

fn read_event(reader: &mut Reader<'_>) -> Result<EventRecord> {
    let tag = reader.read_u8()?;
    let value = match tag {
        command::EMIT_TIMESTAMP_EVENT => EventValue::Timestamp(reader.read_i32()?),
        command::EMIT_COLOR_EVENT => {
            let r = reader.read_u8()?;
            let g = reader.read_u8()?;
            let b = reader.read_u8()?;
            EventValue::Color(Color::new(r, g, b))
        }
        command::EMIT_PERCENTAGE_EVENT => {
            EventValue::Percentage(raw_to_percentage(reader.read_i32()?))
        }
        command::EMIT_LABEL_EVENT => EventValue::Label(reader.read_label()?),
        _ => EventValue::None,
    };

    let label = reader.read_label()?;
    let timestamp = reader.read_u48()?;
    let id = reader.read_u8()?;

    Ok(EventRecord {
        value,
        label,
        timestamp,
        id,
    })
}

/// Tag followed by the peer's MAC
fn read_peer(reader: &mut Reader<'_>) -> Result<Mac> {
    reader.read_u8()?;
    reader.read_mac()
}

fn read_tngl_bytes(reader: &mut Reader<'_>) -> Result<Record> {
    reader.read_u8()?;
    let clock_timestamp = reader.read_u48()?;
    reader.read_u8()?;
    let length = reader.read_u32()? as usize;
    let bytecode = reader.read_bytes(length)?;
    Ok(Record::TnglBytes {
        clock_timestamp,
        bytecode,
    })
}

/// OTA frames are driven by the command layer; inbound copies are skipped
fn skip_ota(reader: &mut Reader<'_>) -> Result<()> {
    reader.read_u8()?;
    let length = reader.read_u32()? as usize;
    debug!("skipping {} bytes of legacy OTA payload", length);
    reader.forward(length);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tag_discards_rest() {
        let mut decoder = Decoder::new();
        let decoded = decoder.decode(&[0x63, 0x01, 0x02], 0);

        assert!(decoded.events.is_empty());
        assert!(decoded.records.is_empty());
        assert_eq!(
            decoded.discarded,
            Some(Discarded {
                tag: 0x63,
                offset: 0,
                bytes: 3
            })
        );
    }

    #[test]
    fn test_truncated_event_is_discarded() {
        let mut decoder = Decoder::new();
        let decoded = decoder.decode(&[command::EMIT_EVENT, b'a', b'b'], 0);
        assert!(decoded.events.is_empty());
        assert_eq!(decoded.discarded.map(|d| d.bytes), Some(3));
    }

    #[test]
    fn test_peer_deduplication() {
        let mut frame = vec![command::PEER_CONNECTED, 1, 2, 3, 4, 5, 6];
        frame.extend_from_slice(&[command::PEER_CONNECTED, 1, 2, 3, 4, 5, 6]);

        let mut decoder = Decoder::new();
        let decoded = decoder.decode(&frame, 0);
        assert_eq!(decoded.records, vec![Record::PeerConnected(Mac([1, 2, 3, 4, 5, 6]))]);
        assert_eq!(decoder.connected_peers().count(), 1);

        let decoded = decoder.decode(&[command::PEER_DISCONNECTED, 1, 2, 3, 4, 5, 6], 0);
        assert_eq!(decoded.records, vec![Record::PeerDisconnected(Mac([1, 2, 3, 4, 5, 6]))]);
        assert_eq!(decoder.connected_peers().count(), 0);
    }

    #[test]
    fn test_running_timeline_is_carried_forward() {
        let mut frame = vec![command::SET_TIMELINE];
        frame.extend_from_slice(&1_000u64.to_le_bytes()[..6]);
        frame.extend_from_slice(&500i32.to_le_bytes());
        frame.push(0);

        let decoded = Decoder::new().decode(&frame, 1_250);
        assert_eq!(
            decoded.records,
            vec![Record::Timeline(TimelineState {
                clock_timestamp: 1_000,
                millis: 750,
                paused: false
            })]
        );
    }

    #[test]
    fn test_ota_frames_are_skipped() {
        let mut frame = vec![command::OTA_BEGIN, 2, 0, 0, 0, 0xAA, 0xBB];
        frame.extend_from_slice(&[command::EMIT_EVENT, b'x', 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 7]);

        let decoded = Decoder::new().decode(&frame, 0);
        assert_eq!(decoded.events.len(), 1);
        assert_eq!(decoded.events[0].id, 7);
        assert!(decoded.discarded.is_none());
    }
}
