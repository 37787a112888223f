//! Device selection criteria
//!
//! Criteria are passed as a list of filters: a device matches when it
//! satisfies every field of at least one filter. An empty list matches any
//! device.

use serde::{Deserialize, Serialize};
use spectoda_core::Mac;

use crate::error::{ConnectorError, Result};

/// Owner signatures are 16 bytes written as 32 hex characters
pub const OWNER_SIGNATURE_LEN: usize = 32;

/// One filter of a selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    /// Exact firmware version, or `!version` to exclude one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fw_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adoption_flag: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

impl SelectionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn name_prefix(mut self, prefix: &str) -> Self {
        self.name_prefix = Some(prefix.to_string());
        self
    }

    pub fn fw_version(mut self, version: &str) -> Self {
        self.fw_version = Some(version.to_string());
        self
    }

    pub fn owner_signature(mut self, signature: &str) -> Self {
        self.owner_signature = Some(signature.to_string());
        self
    }

    pub fn product_code(mut self, code: u16) -> Self {
        self.product_code = Some(code);
        self
    }

    pub fn adoption_flag(mut self, flag: bool) -> Self {
        self.adoption_flag = Some(flag);
        self
    }

    pub fn mac(mut self, mac: &str) -> Self {
        self.mac = Some(mac.to_string());
        self
    }

    /// Reject malformed owner signatures and MAC addresses
    pub fn validate(&self) -> Result<()> {
        if let Some(signature) = &self.owner_signature {
            let is_hex = signature.chars().all(|c| c.is_ascii_hexdigit());
            if signature.len() != OWNER_SIGNATURE_LEN || !is_hex {
                return Err(ConnectorError::SelectionFailed(format!(
                    "owner signature must be {} hex characters",
                    OWNER_SIGNATURE_LEN
                )));
            }
        }
        if let Some(mac) = &self.mac {
            mac.parse::<Mac>()
                .map_err(|e| ConnectorError::SelectionFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Whether `device` satisfies every field of this filter
    pub fn matches(&self, device: &DeviceInfo) -> bool {
        if let Some(name) = &self.name {
            if &device.name != name {
                return false;
            }
        }
        if let Some(prefix) = &self.name_prefix {
            if !device.name.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(version) = &self.fw_version {
            let actual = device.fw_version.as_deref();
            let matched = match version.strip_prefix('!') {
                Some(excluded) => actual != Some(excluded),
                None => actual == Some(version.as_str()),
            };
            if !matched {
                return false;
            }
        }
        if let Some(signature) = &self.owner_signature {
            match &device.owner_signature {
                Some(actual) if actual.eq_ignore_ascii_case(signature) => {}
                _ => return false,
            }
        }
        if let Some(code) = self.product_code {
            if device.product_code != Some(code) {
                return false;
            }
        }
        if let Some(flag) = self.adoption_flag {
            if device.adoption_flag != flag {
                return false;
            }
        }
        if let Some(mac) = &self.mac {
            match (mac.parse::<Mac>(), device.mac) {
                (Ok(wanted), Some(actual)) if wanted == actual => {}
                _ => return false,
            }
        }
        true
    }
}

/// OR over filters; an empty slice matches everything
pub fn matches_any(criteria: &[SelectionCriteria], device: &DeviceInfo) -> bool {
    criteria.is_empty() || criteria.iter().any(|c| c.matches(device))
}

/// A device seen during a scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    pub mac: Option<Mac>,
    pub fw_version: Option<String>,
    pub owner_signature: Option<String>,
    pub product_code: Option<u16>,
    /// Set while the controller is waiting to be adopted
    pub adoption_flag: bool,
    /// Signal strength, higher is closer
    pub rssi: Option<i16>,
}

/// The device a connector currently has selected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedInfo {
    pub connector: String,
    pub name: String,
    pub mac: Option<Mac>,
}

/// The device a connector currently has a session with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedInfo {
    pub connector: String,
    pub name: String,
    pub mac: Option<Mac>,
}

impl From<SelectedInfo> for ConnectedInfo {
    fn from(info: SelectedInfo) -> Self {
        Self {
            connector: info.connector,
            name: info.name,
            mac: info.mac,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceInfo {
        DeviceInfo {
            name: "SC_kitchen".to_string(),
            mac: Some(Mac([0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc])),
            fw_version: Some("UNIVERSAL_0.12.0_20240101".to_string()),
            owner_signature: Some("00112233445566778899aabbccddeeff".to_string()),
            product_code: Some(2),
            adoption_flag: false,
            rssi: Some(-60),
        }
    }

    #[test]
    fn test_and_within_filter() {
        let criteria = SelectionCriteria::new().name_prefix("SC_").product_code(2);
        assert!(criteria.matches(&device()));

        let criteria = SelectionCriteria::new().name_prefix("SC_").product_code(3);
        assert!(!criteria.matches(&device()));
    }

    #[test]
    fn test_or_across_filters() {
        let criteria = vec![
            SelectionCriteria::new().name("other"),
            SelectionCriteria::new().mac("12:34:56:78:9A:BC"),
        ];
        assert!(matches_any(&criteria, &device()));
        assert!(matches_any(&[], &device()));
    }

    #[test]
    fn test_fw_version_negation() {
        let excluded = SelectionCriteria::new().fw_version("!UNIVERSAL_0.12.0_20240101");
        assert!(!excluded.matches(&device()));

        let excluded = SelectionCriteria::new().fw_version("!UNIVERSAL_0.11.0_20230101");
        assert!(excluded.matches(&device()));
    }

    #[test]
    fn test_owner_signature_validation() {
        assert!(SelectionCriteria::new()
            .owner_signature("00112233445566778899AABBCCDDEEFF")
            .validate()
            .is_ok());
        let err = SelectionCriteria::new().owner_signature("1234").validate().unwrap_err();
        assert_eq!(err.code(), "SelectionFailed");
    }

    #[test]
    fn test_criteria_json_keys() {
        let criteria: Vec<SelectionCriteria> =
            serde_json::from_str(r#"[{"namePrefix":"SC_","adoptionFlag":true}]"#).unwrap();
        assert_eq!(criteria[0].name_prefix.as_deref(), Some("SC_"));
        assert_eq!(criteria[0].adoption_flag, Some(true));
    }
}
