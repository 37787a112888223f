//! Connector kind selector

use std::fmt;
use std::str::FromStr;

use crate::error::ConnectorError;

/// Named transport kinds a client can be assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorKind {
    /// Unassign the current connector
    None,
    Dummy,
    /// Dummy with random injected failures
    EDummy,
    WebBluetooth,
    WebSerial,
    /// Mobile application bridge
    Flutter,
    WebSockets,
    /// Best available kind, probed at assignment time
    Automatic,
}

impl ConnectorKind {
    /// Probe order used by [`ConnectorKind::Automatic`]
    pub const AUTOMATIC_PRIORITY: [ConnectorKind; 4] = [
        ConnectorKind::Flutter,
        ConnectorKind::WebBluetooth,
        ConnectorKind::WebSerial,
        ConnectorKind::WebSockets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorKind::None => "none",
            ConnectorKind::Dummy => "dummy",
            ConnectorKind::EDummy => "edummy",
            ConnectorKind::WebBluetooth => "webbluetooth",
            ConnectorKind::WebSerial => "webserial",
            ConnectorKind::Flutter => "flutter",
            ConnectorKind::WebSockets => "websockets",
            ConnectorKind::Automatic => "automatic",
        }
    }
}

impl FromStr for ConnectorKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ConnectorKind::None),
            "dummy" => Ok(ConnectorKind::Dummy),
            "edummy" => Ok(ConnectorKind::EDummy),
            "webbluetooth" => Ok(ConnectorKind::WebBluetooth),
            "webserial" => Ok(ConnectorKind::WebSerial),
            "flutter" => Ok(ConnectorKind::Flutter),
            "websockets" => Ok(ConnectorKind::WebSockets),
            "default" | "automatic" => Ok(ConnectorKind::Automatic),
            other => Err(ConnectorError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("default".parse::<ConnectorKind>().unwrap(), ConnectorKind::Automatic);
        assert_eq!("Automatic".parse::<ConnectorKind>().unwrap(), ConnectorKind::Automatic);
        assert_eq!("edummy".parse::<ConnectorKind>().unwrap(), ConnectorKind::EDummy);
        assert!("bluetooth".parse::<ConnectorKind>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for kind in ConnectorKind::AUTOMATIC_PRIORITY {
            assert_eq!(kind.to_string().parse::<ConnectorKind>().unwrap(), kind);
        }
    }
}
