//! Inbound stream decoding scenarios

use spectoda_core::decoder::Discarded;
use spectoda_core::frame::{encode_event, encode_set_timeline, encode_tngl_bytes};
use spectoda_core::{Color, Decoder, EventValue, Label, Record, TimelineState, BROADCAST_ID};

#[test]
fn test_events_are_returned_most_recent_first() {
    let mut stream = Vec::new();
    let frames = [
        (EventValue::None, "a", 1, BROADCAST_ID),
        (EventValue::Color(Color::new(1, 2, 3)), "b", 2, 4),
        (EventValue::Percentage(-100.0), "c", 3, 5),
    ];
    for (value, label, timestamp, id) in frames {
        stream.extend_from_slice(&encode_event(&value, &Label::new(label), timestamp, id).unwrap());
    }

    let decoded = Decoder::new().decode(&stream, 0);
    let labels: Vec<String> = decoded.events.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["c", "b", "a"]);

    assert_eq!(decoded.events[0].value, EventValue::Percentage(-100.0));
    assert_eq!(decoded.events[1].value, EventValue::Color(Color::new(1, 2, 3)));
    assert_eq!(decoded.events[1].id, 4);
    assert_eq!(decoded.events[2].timestamp, 1);
}

#[test]
fn test_unknown_tag_keeps_preceding_frames() {
    let mut stream = encode_event(&EventValue::Timestamp(250), &Label::new("t"), 9, 1)
        .unwrap()
        .to_vec();
    stream.extend_from_slice(&[0x63, 0x01, 0x02]);
    stream.extend_from_slice(&encode_event(&EventValue::None, &Label::new("lost"), 9, 1).unwrap());

    let decoded = Decoder::new().decode(&stream, 0);
    assert_eq!(decoded.events.len(), 1);
    assert_eq!(decoded.events[0].value, EventValue::Timestamp(250));

    let discarded: Discarded = decoded.discarded.unwrap();
    assert_eq!(discarded.tag, 0x63);
    assert_eq!(discarded.bytes, stream.len() - discarded.offset);
}

#[test]
fn test_paused_timeline_is_not_adjusted() {
    let frame = encode_set_timeline(1_000, 400, true).unwrap();
    let decoded = Decoder::new().decode(&frame, 99_000);
    assert_eq!(
        decoded.records,
        vec![Record::Timeline(TimelineState {
            clock_timestamp: 1_000,
            millis: 400,
            paused: true
        })]
    );
}

#[test]
fn test_tngl_upload_is_decoded() {
    let frame = encode_tngl_bytes(77, &[1, 2, 3, 255]).unwrap();
    let decoded = Decoder::new().decode(&frame, 0);
    assert_eq!(
        decoded.records,
        vec![Record::TnglBytes {
            clock_timestamp: 77,
            bytecode: vec![1, 2, 3, 255]
        }]
    );
}

#[test]
fn test_empty_buffer() {
    let decoded = Decoder::new().decode(&[], 0);
    assert!(decoded.events.is_empty());
    assert!(decoded.records.is_empty());
    assert!(decoded.discarded.is_none());
}

#[test]
fn test_event_record_json_shape() {
    let value = EventValue::Label(Label::new("red"));
    let frame = encode_event(&value, &Label::new("scene"), 5, 2).unwrap();
    let decoded = Decoder::new().decode(&frame, 0);

    let json = serde_json::to_value(&decoded.events[0]).unwrap();
    assert_eq!(json["label"], "scene");
    assert_eq!(json["value"]["type"], "label");
    assert_eq!(json["value"]["value"], "red");
    assert_eq!(json["id"], 2);
}
