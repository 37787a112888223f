//! Dummy connector behaviour

use bytes::Bytes;
use spectoda_connector::traits::ConnectorEventReceiver;
use spectoda_connector::{
    Connector, ConnectorError, ConnectorEvent, DeviceInfo, DummyConfig, DummyConnector, OtaStatus,
    SelectionCriteria,
};
use spectoda_core::constants::command;
use spectoda_core::frame::encode_tngl_bytes;
use spectoda_core::request::{encode_request, parse_response, DEVICE_NAME_SIZE};
use spectoda_core::{compile, Mac, Writer};
use std::time::Duration;
use tokio::sync::mpsc;

const TIMEOUT: Duration = Duration::from_secs(5);

fn device(name: &str, rssi: i16, last: u8) -> DeviceInfo {
    DeviceInfo {
        name: name.to_string(),
        mac: Some(Mac([0, 0, 0, 0, 0, last])),
        fw_version: Some("UNIVERSAL_0.12.0_20240101".to_string()),
        rssi: Some(rssi),
        ..DeviceInfo::default()
    }
}

fn network(config: DummyConfig) -> (DummyConnector, ConnectorEventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DummyConnector::with_config("dummy", config, tx), rx)
}

async fn connected(config: DummyConfig) -> (DummyConnector, ConnectorEventReceiver) {
    let (dummy, mut rx) = network(config);
    dummy.user_select(&[], TIMEOUT).await.unwrap();
    dummy.connect(TIMEOUT).await.unwrap();
    assert_eq!(rx.recv().await, Some(ConnectorEvent::Connected));
    (dummy, rx)
}

fn drain(rx: &mut ConnectorEventReceiver) -> Vec<ConnectorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_auto_select_picks_strongest_match() {
    let config = DummyConfig {
        devices: vec![
            device("SC_far", -90, 1),
            device("SC_near", -40, 2),
            device("XX_nearest", -10, 3),
        ],
        ..DummyConfig::default()
    };
    let (dummy, _rx) = network(config);

    let criteria = [SelectionCriteria::new().name_prefix("SC_")];
    let selected = dummy.auto_select(&criteria, Duration::from_millis(100), TIMEOUT).await.unwrap();
    assert_eq!(selected.name, "SC_near");
    assert_eq!(dummy.selected().await.unwrap(), Some(selected));
}

#[tokio::test]
async fn test_selection_without_match() {
    let (dummy, _rx) = network(DummyConfig::default());
    let criteria = [SelectionCriteria::new().name("missing")];

    let err = dummy.user_select(&criteria, TIMEOUT).await.unwrap_err();
    assert_eq!(err, ConnectorError::UserCanceledSelection);

    let err = dummy.auto_select(&criteria, Duration::ZERO, TIMEOUT).await.unwrap_err();
    assert_eq!(err.code(), "SelectionFailed");

    assert!(dummy.scan(&criteria, Duration::ZERO).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_connection_timeout() {
    let config = DummyConfig {
        latency: Duration::from_millis(200),
        ..DummyConfig::default()
    };
    let (dummy, _rx) = network(config);
    dummy.user_select(&[], TIMEOUT).await.unwrap();

    let err = dummy.connect(Duration::from_millis(10)).await.unwrap_err();
    assert_eq!(err, ConnectorError::ConnectionTimeout);
    assert!(dummy.connected().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_clock_roundtrip() {
    let (dummy, _rx) = connected(DummyConfig::default()).await;

    dummy.set_clock(123_456).await.unwrap();
    let clock = dummy.get_clock().await.unwrap();
    assert!((123_456..123_556).contains(&clock));
}

#[tokio::test(start_paused = true)]
async fn test_clock_read_gives_up_after_three_attempts() {
    let config = DummyConfig {
        latency: Duration::ZERO,
        clock_retry_backoff: Duration::from_millis(100),
        ..DummyConfig::default()
    };
    let (dummy, _rx) = connected(config).await;
    dummy.set_failure_rate(1.0);

    let start = tokio::time::Instant::now();
    assert_eq!(dummy.get_clock().await.unwrap_err(), ConnectorError::ClockReadFailed);
    // two backoffs between three attempts
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(300));

    assert_eq!(dummy.set_clock(1).await.unwrap_err(), ConnectorError::ClockWriteFailed);
}

#[tokio::test]
async fn test_clock_needs_session() {
    let (dummy, _rx) = network(DummyConfig::default());
    assert_eq!(dummy.get_clock().await.unwrap_err(), ConnectorError::DeviceDisconnected);
}

#[tokio::test]
async fn test_unreliable_connect_fails() {
    let (dummy, _rx) = network(DummyConfig {
        failure_rate: 1.0,
        ..DummyConfig::default()
    });
    dummy.user_select(&[], TIMEOUT).await.unwrap();
    let err = dummy.connect(TIMEOUT).await.unwrap_err();
    assert_eq!(err.code(), "ConnectionFailed");
}

#[tokio::test]
async fn test_firmware_update_reports_progress_and_reboots() {
    let config = DummyConfig {
        ota_chunk_size: 10,
        latency: Duration::ZERO,
        ..DummyConfig::default()
    };
    let (dummy, mut rx) = connected(config).await;

    dummy.update_fw(Bytes::from(vec![0xAB; 25])).await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            ConnectorEvent::OtaStatus(OtaStatus::Begin),
            ConnectorEvent::OtaProgress(0),
            ConnectorEvent::OtaProgress(40),
            ConnectorEvent::OtaProgress(80),
            ConnectorEvent::OtaProgress(100),
            ConnectorEvent::OtaStatus(OtaStatus::Success),
            ConnectorEvent::Disconnected,
        ]
    );
    assert!(dummy.connected().await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_firmware_is_rejected() {
    let (dummy, _rx) = connected(DummyConfig::default()).await;
    let err = dummy.update_fw(Bytes::new()).await.unwrap_err();
    assert_eq!(err.code(), "UpdateFailed");
}

#[tokio::test]
async fn test_tngl_upload_changes_fingerprint() {
    let (dummy, _rx) = connected(DummyConfig::default()).await;
    let before = dummy.tngl_fingerprint();

    let bytecode = compile("addDrawing(0s, Infinity, animRainbow(5s, 100%));").unwrap();
    let frame = encode_tngl_bytes(0, &bytecode).unwrap();
    dummy.deliver(frame, TIMEOUT).await.unwrap();

    let after = dummy.tngl_fingerprint();
    assert_ne!(before, after);

    let request = encode_request(command::TNGL_FINGERPRINT_REQUEST, 9, &[]).unwrap();
    let response = dummy.request(request, true, TIMEOUT).await.unwrap().unwrap();
    let body = parse_response(&response, command::TNGL_FINGERPRINT_REQUEST, 9).unwrap();
    assert_eq!(body.remaining(), &after[..]);
}

#[tokio::test]
async fn test_device_config_roundtrip() {
    let (dummy, _rx) = connected(DummyConfig::default()).await;
    let config = r#"{"controller":{"name":"kitchen"}}"#;

    let mut body = Writer::new(4 + config.len());
    body.write_u32(config.len() as u32).unwrap();
    body.write_string(config, config.len()).unwrap();
    let update = encode_request(command::CONFIG_UPDATE_REQUEST, 1, body.bytes()).unwrap();
    let response = dummy.request(update, true, TIMEOUT).await.unwrap().unwrap();
    parse_response(&response, command::CONFIG_UPDATE_REQUEST, 1).unwrap();

    let read = encode_request(command::DEVICE_CONFIG_REQUEST, 2, &[]).unwrap();
    let response = dummy.request(read, true, TIMEOUT).await.unwrap().unwrap();
    let mut body = parse_response(&response, command::DEVICE_CONFIG_REQUEST, 2).unwrap();
    let length = body.read_u32().unwrap() as usize;
    assert_eq!(body.read_string(length).unwrap(), config);
}

#[tokio::test]
async fn test_adopt_echoes_name_and_mac() {
    let (dummy, _rx) = connected(DummyConfig::default()).await;

    let mut body = Writer::new(32 + DEVICE_NAME_SIZE);
    body.write_bytes(&[0x11; 32], 32).unwrap();
    body.write_string("kitchen", DEVICE_NAME_SIZE).unwrap();
    let request = encode_request(command::ADOPT_REQUEST, 5, body.bytes()).unwrap();

    let response = dummy.request(request, true, TIMEOUT).await.unwrap().unwrap();
    let mut body = parse_response(&response, command::ADOPT_REQUEST, 5).unwrap();
    assert_eq!(body.read_mac().unwrap(), Mac([0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc]));
    assert_eq!(body.read_string(DEVICE_NAME_SIZE).unwrap(), "kitchen");
}

#[tokio::test]
async fn test_reboot_request_drops_session() {
    let (dummy, mut rx) = connected(DummyConfig::default()).await;

    let request = encode_request(command::DEVICE_REBOOT_REQUEST, 3, &[]).unwrap();
    assert!(dummy.request(request, false, TIMEOUT).await.unwrap().is_none());
    assert_eq!(rx.recv().await, Some(ConnectorEvent::Disconnected));
}

#[tokio::test]
async fn test_unknown_request_flag() {
    let (dummy, _rx) = connected(DummyConfig::default()).await;
    let request = encode_request(99, 3, &[]).unwrap();
    let err = dummy.request(request, true, TIMEOUT).await.unwrap_err();
    assert_eq!(err.code(), "RequestFailed");
}

#[tokio::test]
async fn test_destroy_always_resolves() {
    let (dummy, mut rx) = connected(DummyConfig::default()).await;
    dummy.destroy().await.unwrap();
    dummy.destroy().await.unwrap();

    assert_eq!(drain(&mut rx), vec![ConnectorEvent::Disconnected]);
    assert!(dummy.selected().await.unwrap().is_none());
}
