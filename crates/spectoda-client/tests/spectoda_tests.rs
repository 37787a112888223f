//! Device API tests against the dummy and recording connectors

use bytes::Bytes;
use parking_lot::Mutex;
use spectoda_client::{ClientError, ConnectionState, PeerInfo, Spectoda, SpectodaEvent};
use spectoda_connector::{
    Connector, ConnectorFactory, ConnectorKind, DummyConfig, DummyConnector, OtaStatus,
};
use spectoda_core::constants::command;
use spectoda_core::request::{decode_request, encode_response};
use spectoda_core::{Color, EventValue, Mac, TimeTrackEvent};
use spectoda_test_utils::{
    wait_for, EventCollector, RecordingConnector, RecordingOptions, Responder,
    DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT,
};
use std::sync::Arc;

const SIGNATURE: &str = "00112233445566778899aabbccddeeff";
const KEY: &str = "ffeeddccbbaa99887766554433221100";

async fn connected_dummy() -> Spectoda {
    let spectoda = Spectoda::builder().connector("dummy").connect().await.unwrap();
    spectoda.connect().await.unwrap();
    spectoda
}

fn recording_factory() -> ConnectorFactory {
    Arc::new(|events| Arc::new(RecordingConnector::new(events)) as Arc<dyn Connector>)
}

async fn wait_for_state(spectoda: &Spectoda, state: ConnectionState) -> bool {
    wait_for(|| async { spectoda.state() == state }, DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT).await
}

// ============================================================================
// Session scenario
// ============================================================================

#[tokio::test]
async fn test_connect_emit_disconnect() {
    let spectoda = Spectoda::builder().connector("dummy").connect().await.unwrap();
    let collector = EventCollector::spawn(spectoda.subscribe());

    let info = spectoda.connect().await.unwrap();
    assert_eq!(info.name, "SC_DUMMY");
    assert!(spectoda.is_connected());

    spectoda.emit_event("evt1", 0xFF).await.unwrap();

    let event = collector
        .wait_for_event(|e| matches!(e, SpectodaEvent::Events(_)), DEFAULT_TIMEOUT)
        .await
        .unwrap();
    let SpectodaEvent::Events(records) = event else {
        panic!("expected events");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value, EventValue::None);
    assert_eq!(records[0].value.type_name(), "none");
    assert_eq!(records[0].label.as_str(), "evt1");
    assert_eq!(records[0].id, 0xFF);

    spectoda.disconnect().await.unwrap();
    assert_eq!(spectoda.state(), ConnectionState::Disconnected);

    // second disconnect has nothing to wait for
    spectoda.disconnect().await.unwrap();
    assert_eq!(spectoda.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_concurrent_connect_is_refused() {
    let spectoda = Spectoda::builder().connector("dummy").connect().await.unwrap();

    let (first, second) = tokio::join!(spectoda.connect(), spectoda.connect());
    assert!(first.is_ok());
    assert_eq!(second.unwrap_err(), ClientError::ConnectingInProgress);
}

#[tokio::test]
async fn test_connect_without_match_fails_selection() {
    let spectoda = Spectoda::builder().connector("dummy").connect().await.unwrap();
    let criteria = [spectoda_connector::SelectionCriteria::new().name("SC_OTHER")];

    let err = spectoda.connect_with(&criteria, true).await.unwrap_err();
    assert_eq!(err.code(), "SelectionFailed");
    assert_eq!(spectoda.state(), ConnectionState::Disconnected);
}

// ============================================================================
// Connector assignment
// ============================================================================

#[tokio::test]
async fn test_assign_builtin_kinds() {
    let spectoda = Spectoda::builder().build();
    assert_eq!(spectoda.connector_kind(), None);

    spectoda.assign_connector("dummy").await.unwrap();
    assert_eq!(spectoda.connector_kind().as_deref(), Some("dummy"));

    spectoda.assign_connector("EDummy").await.unwrap();
    assert_eq!(spectoda.connector_kind().as_deref(), Some("edummy"));

    spectoda.assign_connector("none").await.unwrap();
    assert_eq!(spectoda.connector_kind(), None);
}

#[tokio::test]
async fn test_assign_unknown_and_unavailable_kinds() {
    let spectoda = Spectoda::builder().build();

    let err = spectoda.assign_connector("carrier-pigeon").await.unwrap_err();
    assert_eq!(err.code(), "UnknownConnector");

    let err = spectoda.assign_connector("webbluetooth").await.unwrap_err();
    assert_eq!(err.code(), "ConnectorUnavailable");

    let err = spectoda.assign_connector("automatic").await.unwrap_err();
    assert_eq!(err.code(), "ConnectorUnavailable");
}

#[tokio::test]
async fn test_automatic_uses_registered_factory() {
    let spectoda = Spectoda::builder()
        .register_connector(ConnectorKind::WebSerial, recording_factory())
        .connector("default")
        .connect()
        .await
        .unwrap();

    assert_eq!(spectoda.connector_kind().as_deref(), Some(RecordingConnector::KIND));
}

#[tokio::test]
async fn test_reassignment_destroys_previous_connector() {
    let spectoda = Spectoda::builder().build();
    let recorder = spectoda.attach_connector(RecordingConnector::new).await.unwrap();

    spectoda.assign_connector("dummy").await.unwrap();
    assert!(recorder.is_destroyed());
    assert_eq!(spectoda.connector_kind().as_deref(), Some("dummy"));
}

// ============================================================================
// Emits, TNGL and timeline
// ============================================================================

#[tokio::test]
async fn test_emits_for_same_label_coalesce() {
    let spectoda = Spectoda::builder().build();
    let recorder = spectoda.attach_connector(RecordingConnector::new).await.unwrap();

    let (first, second, other) = tokio::join!(
        spectoda.emit_color("color", Color::new(255, 0, 0), 1),
        spectoda.emit_color("color", Color::new(0, 0, 255), 1),
        spectoda.emit_color("color", Color::new(0, 255, 0), 2),
    );
    assert!(first.is_ok() && second.is_ok() && other.is_ok());

    let delivered = recorder.delivered();
    assert_eq!(delivered.len(), 1);
    let frames = delivered[0].as_ref();
    assert_eq!(frames.len(), 2 * 16);

    assert_eq!(frames[0], command::EMIT_COLOR_EVENT);
    assert_eq!(&frames[1..4], &[0, 0, 255]);
    assert_eq!(&frames[4..9], b"color");
    assert_eq!(frames[15], 1);

    assert_eq!(&frames[17..20], &[0, 255, 0]);
    assert_eq!(frames[31], 2);
}

#[tokio::test]
async fn test_emit_percentage_is_clamped() {
    let spectoda = Spectoda::builder().build();
    let recorder = spectoda.attach_connector(RecordingConnector::new).await.unwrap();

    spectoda.emit_percentage("brigh", 150.0, 0xFF).await.unwrap();

    let frame = recorder.delivered().remove(0);
    assert_eq!(frame[0], command::EMIT_PERCENTAGE_EVENT);
    assert_eq!(&frame[1..5], &268_435_455i32.to_le_bytes());
}

#[tokio::test]
async fn test_timeline_updates_are_framed() {
    let spectoda = Spectoda::builder().build();
    let recorder = spectoda.attach_connector(RecordingConnector::new).await.unwrap();

    spectoda.set_timeline(1_500, true).await.unwrap();
    let frame = recorder.delivered().remove(0);
    assert_eq!(frame.len(), 12);
    assert_eq!(frame[0], command::SET_TIMELINE);
    assert_eq!(&frame[7..11], &1_500i32.to_le_bytes());
    assert_eq!(frame[11], command::TIMELINE_PAUSED_BIT);

    spectoda.play_timeline().await.unwrap();
    let frame = recorder.delivered().remove(1);
    assert_eq!(frame[11], 0);
    assert!(!spectoda.timeline().lock().paused());
}

#[tokio::test]
async fn test_timeline_listeners_can_read_the_timeline() {
    let spectoda = Spectoda::builder().build();
    spectoda.attach_connector(RecordingConnector::new).await.unwrap();

    let timeline = spectoda.timeline();
    let observed = Arc::new(Mutex::new(Vec::new()));
    {
        let track = Arc::downgrade(&timeline);
        let observed = Arc::clone(&observed);
        timeline.lock().on(move |event| {
            let paused = track.upgrade().and_then(|t| t.try_lock().map(|t| t.paused()));
            observed.lock().push((*event, paused));
        });
    }

    spectoda.pause_timeline().await.unwrap();
    spectoda.play_timeline().await.unwrap();

    let observed = observed.lock().clone();
    assert!(!observed.is_empty());
    assert!(observed.iter().all(|(_, paused)| paused.is_some()));
    assert!(observed.contains(&(TimeTrackEvent::Pause, Some(true))));
    assert!(observed.contains(&(TimeTrackEvent::Play, Some(false))));
}

#[tokio::test]
async fn test_timeline_updates_coalesce() {
    let spectoda = Spectoda::builder().build();
    let recorder = spectoda.attach_connector(RecordingConnector::new).await.unwrap();

    let (a, b) = tokio::join!(spectoda.set_timeline(100, true), spectoda.set_timeline(200, true));
    assert!(a.is_ok() && b.is_ok());

    let delivered = recorder.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].len(), 12);
}

#[tokio::test]
async fn test_tngl_upload_changes_fingerprint() {
    let spectoda = Spectoda::builder().build();
    let dummy = spectoda.attach_connector(DummyConnector::new).await.unwrap();
    spectoda.connect().await.unwrap();
    let collector = EventCollector::spawn(spectoda.subscribe());

    let before = spectoda.get_tngl_fingerprint().await.unwrap();
    assert_eq!(before, "0".repeat(64));

    spectoda
        .write_tngl("setDrawing(0s, Infinity, animFill(5s, #ff0000));")
        .await
        .unwrap();

    let after = spectoda.get_tngl_fingerprint().await.unwrap();
    assert_ne!(after, before);
    assert_eq!(after, hex::encode(dummy.tngl_fingerprint()));

    assert!(collector
        .wait_for_event(|e| matches!(e, SpectodaEvent::TnglUpdated { .. }), DEFAULT_TIMEOUT)
        .await
        .is_some());
}

#[tokio::test]
async fn test_invalid_tngl_is_not_sent() {
    let spectoda = Spectoda::builder().build();
    let recorder = spectoda.attach_connector(RecordingConnector::new).await.unwrap();

    let err = spectoda.write_tngl("animFill(5, #ff0000)").await.unwrap_err();
    assert_eq!(err.code(), "CompilationError");
    assert!(recorder.delivered().is_empty());
}

// ============================================================================
// Device requests
// ============================================================================

#[tokio::test]
async fn test_fw_version_and_peers() {
    let peer = Mac([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    let spectoda = Spectoda::builder().build();
    spectoda
        .attach_connector(|events| {
            let config = DummyConfig {
                peers: vec![(peer, -60)],
                ..Default::default()
            };
            DummyConnector::with_config("dummy", config, events)
        })
        .await
        .unwrap();
    spectoda.connect().await.unwrap();

    assert_eq!(spectoda.get_fw_version().await.unwrap(), "DUMMY_0.12.0_20240101");
    assert_eq!(
        spectoda.get_connected_peers_info().await.unwrap(),
        vec![PeerInfo { mac: peer, rssi: -60 }]
    );
}

#[tokio::test]
async fn test_device_config_roundtrip() {
    let spectoda = connected_dummy().await;

    assert_eq!(spectoda.read_device_config().await.unwrap(), "{}");

    let err = spectoda.update_device_config("{not json").await.unwrap_err();
    assert_eq!(err.code(), "InvalidArgument");

    spectoda.update_device_config(r#"{"brightness":50}"#).await.unwrap();
    assert_eq!(spectoda.read_device_config().await.unwrap(), r#"{"brightness":50}"#);
}

#[tokio::test]
async fn test_adopt_requires_owner() {
    let spectoda = connected_dummy().await;
    let err = spectoda.adopt("kitchen").await.unwrap_err();
    assert_eq!(err.code(), "InvalidArgument");
}

#[tokio::test]
async fn test_adopt_with_owner() {
    let spectoda = Spectoda::builder()
        .connector("dummy")
        .owner(SIGNATURE, KEY)
        .connect()
        .await
        .unwrap();
    spectoda.connect().await.unwrap();

    let adopted = spectoda.adopt("kitchen").await.unwrap();
    assert_eq!(adopted.name, "kitchen");
    assert_eq!(adopted.mac, "12:34:56:78:9a:bc".parse::<Mac>().unwrap());
}

#[tokio::test]
async fn test_device_error_code_fails_request() {
    let responder: Responder = Arc::new(|payload: &[u8]| {
        let (flag, uuid, _) = decode_request(payload).ok()?;
        let response_flag = command::response_flag(flag)?;
        encode_response(response_flag, uuid, 3, &[]).ok()
    });
    let spectoda = Spectoda::builder().build();
    spectoda
        .attach_connector(|events| {
            RecordingConnector::with_options(
                events,
                RecordingOptions {
                    responder: Some(responder),
                    ..Default::default()
                },
            )
        })
        .await
        .unwrap();

    let err = spectoda.get_fw_version().await.unwrap_err();
    assert_eq!(err.code(), "RequestFailed");
}

#[tokio::test]
async fn test_mismatched_uuid_is_rejected() {
    let responder: Responder = Arc::new(|payload: &[u8]| {
        let (flag, uuid, _) = decode_request(payload).ok()?;
        let response_flag = command::response_flag(flag)?;
        encode_response(response_flag, uuid.wrapping_add(1), 0, &[0; 32]).ok()
    });
    let spectoda = Spectoda::builder().build();
    spectoda
        .attach_connector(|events| {
            RecordingConnector::with_options(
                events,
                RecordingOptions {
                    responder: Some(responder),
                    ..Default::default()
                },
            )
        })
        .await
        .unwrap();

    let err = spectoda.get_tngl_fingerprint().await.unwrap_err();
    assert_eq!(err.code(), "InvalidResponseUuid");
}

#[tokio::test]
async fn test_reboot_drops_connection() {
    let spectoda = connected_dummy().await;
    spectoda.reboot_device().await.unwrap();
    assert!(wait_for_state(&spectoda, ConnectionState::Disconnected).await);
}

// ============================================================================
// Firmware and clock
// ============================================================================

#[tokio::test]
async fn test_firmware_update_reports_progress() {
    let spectoda = connected_dummy().await;
    let collector = EventCollector::spawn(spectoda.subscribe());

    spectoda
        .update_device_firmware(Bytes::from(vec![0xAB; 1024]))
        .await
        .unwrap();

    assert!(collector
        .wait_for_event(|e| *e == SpectodaEvent::OtaStatus(OtaStatus::Success), DEFAULT_TIMEOUT)
        .await
        .is_some());
    let ota: Vec<SpectodaEvent> = collector.matching(|e| {
        matches!(e, SpectodaEvent::OtaStatus(_) | SpectodaEvent::OtaProgress(_))
    });
    assert_eq!(ota.first(), Some(&SpectodaEvent::OtaStatus(OtaStatus::Begin)));
    assert_eq!(ota.last(), Some(&SpectodaEvent::OtaStatus(OtaStatus::Success)));
    assert!(ota.contains(&SpectodaEvent::OtaProgress(100)));

    // the device restarts into the new firmware
    assert!(wait_for_state(&spectoda, ConnectionState::Disconnected).await);
}

#[tokio::test]
async fn test_failed_firmware_update_disconnects() {
    let spectoda = Spectoda::builder().build();
    let recorder = spectoda.attach_connector(RecordingConnector::new).await.unwrap();
    spectoda.connect().await.unwrap();

    let err = spectoda.update_device_firmware(Bytes::new()).await.unwrap_err();
    assert_eq!(err.code(), "UpdateFailed");
    assert!(recorder.disconnects() >= 1);
    assert_eq!(spectoda.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_clock_sync_roundtrip() {
    let spectoda = Spectoda::builder().build();
    let recorder = spectoda.attach_connector(RecordingConnector::new).await.unwrap();

    recorder.set_device_clock(1_000_000);
    assert_eq!(spectoda.sync_clock().await.unwrap(), 1_000_000);

    recorder.set_device_clock(0);
    spectoda.set_device_clock().await.unwrap();
    assert!(recorder.device_clock() >= 1_000_000);
}
