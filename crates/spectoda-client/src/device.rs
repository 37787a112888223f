//! Request bodies and parsed responses for device queries
//!
//! ```text
//! fw version        -> string 32
//! tngl fingerprint  -> 32 bytes
//! connected peers   -> count u16, count * (mac 6, rssi i16)
//! device config     -> length u32, string
//! config update     <- length u32, string
//! adopt             <- signature 16, key 16, name 16
//!                   -> mac 6, name 16
//! ```

use serde::{Deserialize, Serialize};
use spectoda_core::request::{
    DEVICE_NAME_SIZE, FW_VERSION_SIZE, OWNER_KEY_SIZE, OWNER_SIGNATURE_SIZE, TNGL_FINGERPRINT_SIZE,
};
use spectoda_core::{Mac, Reader, Writer};

use crate::error::{ClientError, Result};

/// A controller reachable through the connected one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub mac: Mac,
    pub rssi: i16,
}

/// Identity a controller reports after adoption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdoptedDevice {
    pub mac: Mac,
    pub name: String,
}

pub(crate) fn read_fw_version(body: &[u8]) -> Result<String> {
    Ok(Reader::new(body).read_string(FW_VERSION_SIZE)?)
}

pub(crate) fn read_fingerprint(body: &[u8]) -> Result<String> {
    let bytes = Reader::new(body).read_bytes(TNGL_FINGERPRINT_SIZE)?;
    Ok(hex::encode(bytes))
}

pub(crate) fn read_peers(body: &[u8]) -> Result<Vec<PeerInfo>> {
    let mut reader = Reader::new(body);
    let count = reader.read_u16()?;
    (0..count)
        .map(|_| -> Result<PeerInfo> {
            let mac = reader.read_mac()?;
            let rssi = reader.read_i16()?;
            Ok(PeerInfo { mac, rssi })
        })
        .collect()
}

pub(crate) fn read_device_config(body: &[u8]) -> Result<String> {
    let mut reader = Reader::new(body);
    let length = reader.read_u32()? as usize;
    Ok(reader.read_string(length)?)
}

pub(crate) fn config_update_body(config: &str) -> Result<Vec<u8>> {
    let mut writer = Writer::new(4 + config.len());
    writer.write_u32(config.len() as u32)?;
    writer.write_string(config, config.len())?;
    Ok(writer.bytes().to_vec())
}

pub(crate) fn adopt_body(
    signature: &[u8; OWNER_SIGNATURE_SIZE],
    key: &[u8; OWNER_KEY_SIZE],
    name: &str,
) -> Result<Vec<u8>> {
    let mut writer = Writer::new(OWNER_SIGNATURE_SIZE + OWNER_KEY_SIZE + DEVICE_NAME_SIZE);
    writer.write_bytes(signature, OWNER_SIGNATURE_SIZE)?;
    writer.write_bytes(key, OWNER_KEY_SIZE)?;
    writer.write_string(name, DEVICE_NAME_SIZE)?;
    Ok(writer.bytes().to_vec())
}

pub(crate) fn read_adopted(body: &[u8]) -> Result<AdoptedDevice> {
    let mut reader = Reader::new(body);
    let mac = reader.read_mac()?;
    let name = reader.read_string(DEVICE_NAME_SIZE)?;
    Ok(AdoptedDevice { mac, name })
}

/// Decode a 32 hex character owner field into its 16 raw bytes
pub(crate) fn parse_owner_field(field: &str, value: &str) -> Result<[u8; 16]> {
    let bytes =
        hex::decode(value).map_err(|e| ClientError::InvalidArgument(format!("{field}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| ClientError::InvalidArgument(format!("{field} must be 32 hex characters")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_list() {
        let body = [2, 0, 1, 2, 3, 4, 5, 6, 0xCE, 0xFF, 6, 5, 4, 3, 2, 1, 0xB0, 0xFF];
        let peers = read_peers(&body).unwrap();
        assert_eq!(
            peers,
            vec![
                PeerInfo {
                    mac: Mac([1, 2, 3, 4, 5, 6]),
                    rssi: -50
                },
                PeerInfo {
                    mac: Mac([6, 5, 4, 3, 2, 1]),
                    rssi: -80
                },
            ]
        );
    }

    #[test]
    fn test_truncated_peer_list() {
        assert_eq!(read_peers(&[1, 0, 1, 2]).unwrap_err().code(), "ReadOutOfRange");
    }

    #[test]
    fn test_config_body() {
        let body = config_update_body(r#"{"a":1}"#).unwrap();
        assert_eq!(&body[..4], &[7, 0, 0, 0]);
        assert_eq!(read_device_config(&body).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_owner_field() {
        let signature =
            parse_owner_field("owner_signature", "00112233445566778899aabbccddeeff").unwrap();
        assert_eq!(signature[0], 0x00);
        assert_eq!(signature[15], 0xff);

        let short = parse_owner_field("owner_key", "0011").unwrap_err();
        assert_eq!(short.code(), "InvalidArgument");
        assert!(parse_owner_field("owner_key", "zz").is_err());
    }

    #[test]
    fn test_adopt_body_layout() {
        let body = adopt_body(&[1; 16], &[2; 16], "kitchen").unwrap();
        assert_eq!(body.len(), 48);
        assert_eq!(&body[32..39], b"kitchen");
        assert!(body[39..].iter().all(|b| *b == 0));
    }
}
