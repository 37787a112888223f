//! Protocol value types shared by the compiler, decoder and client

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Device id addressing every device in the network
pub const BROADCAST_ID: u8 = 0xFF;

/// Linear encoding range of a percentage: ±268435455 represents ±100 %
pub const PERCENTAGE_MAX: i32 = 268_435_455;
pub const PERCENTAGE_MIN: i32 = -268_435_455;

/// Five byte event label.
///
/// Longer names are truncated, shorter ones are NUL padded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Label([u8; Label::SIZE]);

impl Label {
    pub const SIZE: usize = 5;

    /// Build a label from a name, truncating to five bytes
    pub fn new(name: &str) -> Self {
        let mut raw = [0u8; Self::SIZE];
        let bytes = name.as_bytes();
        let n = bytes.len().min(Self::SIZE);
        raw[..n].copy_from_slice(&bytes[..n]);
        Self(raw)
    }

    pub fn from_raw(raw: [u8; Self::SIZE]) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> &[u8; Self::SIZE] {
        &self.0
    }

    /// Label text up to the first NUL byte
    pub fn as_str(&self) -> String {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(Self::SIZE);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.as_str())
    }
}

impl From<&str> for Label {
    fn from(name: &str) -> Self {
        Label::new(name)
    }
}

impl Serialize for Label {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Label::new(&s))
    }
}

/// Six byte device MAC address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Mac(pub [u8; Mac::SIZE]);

impl Mac {
    pub const SIZE: usize = 6;
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Mac {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != Self::SIZE {
            return Err(Error::InvalidValue(format!("invalid mac address: {s}")));
        }
        let mut raw = [0u8; Self::SIZE];
        for (slot, part) in raw.iter_mut().zip(parts) {
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| Error::InvalidValue(format!("invalid mac address: {s}")))?;
        }
        Ok(Mac(raw))
    }
}

impl Serialize for Mac {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Mac {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const BLACK: Color = Color::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` or `rrggbb`
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(Error::InvalidValue(format!("invalid color: {hex}")));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| Error::InvalidValue(format!("invalid color: {hex}")))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Map a percentage in [-100, 100] onto the 28-bit signed wire range
pub fn percentage_to_raw(percent: f64) -> i32 {
    let clamped = percent.clamp(-100.0, 100.0);
    let span = f64::from(PERCENTAGE_MAX) - f64::from(PERCENTAGE_MIN);
    ((clamped + 100.0) * span / 200.0 + f64::from(PERCENTAGE_MIN)) as i32
}

/// Inverse of [`percentage_to_raw`]
pub fn raw_to_percentage(raw: i32) -> f64 {
    f64::from(raw) * 100.0 / f64::from(PERCENTAGE_MAX)
}

/// Typed value carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum EventValue {
    None,
    /// Milliseconds
    Timestamp(i32),
    Color(Color),
    /// Percent in [-100, 100]
    Percentage(f64),
    Label(Label),
}

impl EventValue {
    /// Name of the value type as used by applications
    pub fn type_name(&self) -> &'static str {
        match self {
            EventValue::None => "none",
            EventValue::Timestamp(_) => "timestamp",
            EventValue::Color(_) => "color",
            EventValue::Percentage(_) => "percentage",
            EventValue::Label(_) => "label",
        }
    }
}

/// A decoded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub value: EventValue,
    pub label: Label,
    /// 48-bit network clock timestamp
    pub timestamp: u64,
    /// Destination device id, 0xFF for broadcast
    pub id: u8,
}

/// Timeline state carried by a set-timeline frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineState {
    /// Network clock at which the frame was produced
    pub clock_timestamp: u64,
    /// Timeline position, already adjusted to the local network clock
    pub millis: i64,
    pub paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_truncation() {
        let label = Label::new("toolong");
        assert_eq!(label.as_str(), "toolo");
        assert_eq!(Label::new("ab").as_raw(), &[b'a', b'b', 0, 0, 0]);
    }

    #[test]
    fn test_mac_parse_display() {
        let mac: Mac = "12:34:56:78:9a:bc".parse().unwrap();
        assert_eq!(mac.0, [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc]);
        assert_eq!(mac.to_string(), "12:34:56:78:9a:bc");
        assert!("12:34".parse::<Mac>().is_err());
    }

    #[test]
    fn test_color_hex() {
        let color = Color::from_hex("#ff8000").unwrap();
        assert_eq!(color, Color::new(255, 128, 0));
        assert_eq!(color.to_hex(), "#ff8000");
        assert!(Color::from_hex("#ff80").is_err());
    }

    #[test]
    fn test_percentage_mapping() {
        assert_eq!(percentage_to_raw(50.0), 134_217_727);
        assert_eq!(percentage_to_raw(100.0), PERCENTAGE_MAX);
        assert_eq!(percentage_to_raw(-100.0), PERCENTAGE_MIN);
        assert!((raw_to_percentage(PERCENTAGE_MAX) - 100.0).abs() < 1e-9);
    }
}
