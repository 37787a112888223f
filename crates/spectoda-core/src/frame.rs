//! Outgoing command frames
//!
//! Emit-event frames:
//! ```text
//! ┌──────┬──────────────────┬─────────┬──────────────┬────┐
//! │ tag  │ value (by tag)   │ label 5 │ timestamp 6  │ id │
//! └──────┴──────────────────┴─────────┴──────────────┴────┘
//!   111    -                            48-bit network clock
//!   112    i32 millis                   0xFF = broadcast
//!   113    r g b
//!   114    i32 (±268435455 = ±100 %)
//!   115    label 5
//! ```
//!
//! Set-timeline frame: tag 105, 6-byte clock, i32 timeline, flags (bit 4 paused).
//! TNGL upload frame: tag 104, 6-byte clock, 1 reserved byte, u32 length, bytecode.

use bytes::Bytes;

use crate::codec::Writer;
use crate::constants::command;
use crate::types::{percentage_to_raw, EventValue, Label};
use crate::Result;

/// Label + timestamp + id trailer shared by every emit frame
pub const EVENT_TRAILER_SIZE: usize = Label::SIZE + 6 + 1;

/// Size of a set-timeline frame
pub const SET_TIMELINE_SIZE: usize = 1 + 6 + 4 + 1;

/// Header size of a TNGL upload frame
pub const TNGL_BYTES_HEADER_SIZE: usize = 1 + 6 + 1 + 4;

/// Frame tag used to emit `value`
pub fn event_tag(value: &EventValue) -> u8 {
    match value {
        EventValue::None => command::EMIT_EVENT,
        EventValue::Timestamp(_) => command::EMIT_TIMESTAMP_EVENT,
        EventValue::Color(_) => command::EMIT_COLOR_EVENT,
        EventValue::Percentage(_) => command::EMIT_PERCENTAGE_EVENT,
        EventValue::Label(_) => command::EMIT_LABEL_EVENT,
    }
}

/// Encoded size of the value part of an emit frame
pub fn event_value_size(value: &EventValue) -> usize {
    match value {
        EventValue::None => 0,
        EventValue::Timestamp(_) | EventValue::Percentage(_) => 4,
        EventValue::Color(_) => 3,
        EventValue::Label(_) => Label::SIZE,
    }
}

/// Encode an emit-event frame
pub fn encode_event(value: &EventValue, label: &Label, timestamp: u64, id: u8) -> Result<Bytes> {
    let mut writer = Writer::new(1 + event_value_size(value) + EVENT_TRAILER_SIZE);
    writer.write_flag(event_tag(value))?;

    match value {
        EventValue::None => {}
        EventValue::Timestamp(millis) => writer.write_i32(*millis)?,
        EventValue::Color(color) => {
            writer.write_u8(color.r)?;
            writer.write_u8(color.g)?;
            writer.write_u8(color.b)?;
        }
        EventValue::Percentage(percent) => writer.write_i32(percentage_to_raw(*percent))?,
        EventValue::Label(value) => writer.write_label(value)?,
    }

    writer.write_label(label)?;
    writer.write_u48(timestamp)?;
    writer.write_u8(id)?;
    Ok(writer.into_bytes())
}

/// Encode a set-timeline frame
pub fn encode_set_timeline(
    clock_timestamp: u64,
    timeline_millis: i32,
    paused: bool,
) -> Result<Bytes> {
    let mut writer = Writer::new(SET_TIMELINE_SIZE);
    writer.write_flag(command::SET_TIMELINE)?;
    writer.write_u48(clock_timestamp)?;
    writer.write_i32(timeline_millis)?;
    writer.write_u8(if paused { command::TIMELINE_PAUSED_BIT } else { 0 })?;
    Ok(writer.into_bytes())
}

/// Wrap compiled TNGL bytecode in an upload frame
pub fn encode_tngl_bytes(clock_timestamp: u64, bytecode: &[u8]) -> Result<Bytes> {
    let mut writer = Writer::new(TNGL_BYTES_HEADER_SIZE + bytecode.len());
    writer.write_flag(command::TNGL_BYTES)?;
    writer.write_u48(clock_timestamp)?;
    writer.write_u8(0)?;
    writer.write_u32(bytecode.len() as u32)?;
    writer.write_bytes(bytecode, bytecode.len())?;
    Ok(writer.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, BROADCAST_ID};

    #[test]
    fn test_encode_plain_event() {
        let bytes =
            encode_event(&EventValue::None, &Label::new("evt1"), 0x0102, BROADCAST_ID).unwrap();
        assert_eq!(
            bytes.as_ref(),
            &[111, b'e', b'v', b't', b'1', 0, 0x02, 0x01, 0, 0, 0, 0, 0xFF]
        );
    }

    #[test]
    fn test_encode_color_event_size() {
        let value = EventValue::Color(Color::new(1, 2, 3));
        let bytes = encode_event(&value, &Label::new("col"), 0, 3).unwrap();
        assert_eq!(bytes.len(), 1 + 3 + EVENT_TRAILER_SIZE);
        assert_eq!(&bytes[..4], &[113, 1, 2, 3]);
    }

    #[test]
    fn test_encode_set_timeline_paused_flag() {
        let bytes = encode_set_timeline(10, -5, true).unwrap();
        assert_eq!(bytes.len(), SET_TIMELINE_SIZE);
        assert_eq!(bytes[0], command::SET_TIMELINE);
        assert_eq!(bytes[SET_TIMELINE_SIZE - 1], command::TIMELINE_PAUSED_BIT);
    }
}
