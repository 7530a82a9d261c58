use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 128-bit identifier of a stream.
///
/// Rendered in the canonical lowercase `8-4-4-4-12` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamUuid(pub [u8; 16]);

impl StreamUuid {
    pub const NIL: StreamUuid = StreamUuid([0; 16]);

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Random (version 4, RFC 4122 variant) identifier.
    pub fn new_v4() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl fmt::Display for StreamUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UuidParseError {
    #[error("expected 36 characters, got {0}")]
    Length(usize),
    #[error("misplaced or missing hyphen at position {0}")]
    Hyphen(usize),
    #[error("invalid hex digit at position {0}")]
    Digit(usize),
}

impl FromStr for StreamUuid {
    type Err = UuidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.as_bytes();
        if raw.len() != 36 {
            return Err(UuidParseError::Length(raw.len()));
        }

        let mut bytes = [0u8; 16];
        let mut pos = 0;
        for (i, out) in bytes.iter_mut().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                if raw[pos] != b'-' {
                    return Err(UuidParseError::Hyphen(pos));
                }
                pos += 1;
            }
            let hi = hex_value(raw[pos]).ok_or(UuidParseError::Digit(pos))?;
            let lo = hex_value(raw[pos + 1]).ok_or(UuidParseError::Digit(pos + 1))?;
            *out = (hi << 4) | lo;
            pos += 2;
        }
        Ok(Self(bytes))
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl Serialize for StreamUuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StreamUuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_canonical_lowercase() {
        let uuid = StreamUuid::from_bytes([
            0x12, 0x3e, 0x45, 0x67, 0xe8, 0x9b, 0x12, 0xd3, 0xa4, 0x56, 0x42, 0x66, 0x14, 0x17,
            0x40, 0x00,
        ]);
        assert_eq!(uuid.to_string(), "123e4567-e89b-12d3-a456-426614174000");
    }

    #[test]
    fn parses_mixed_case() {
        let uuid: StreamUuid = "123E4567-e89b-12d3-A456-426614174000".parse().unwrap();
        assert_eq!(uuid.to_string(), "123e4567-e89b-12d3-a456-426614174000");
    }

    #[test]
    fn rejects_malformed_text() {
        assert_eq!(
            "123e4567".parse::<StreamUuid>(),
            Err(UuidParseError::Length(8))
        );
        assert_eq!(
            "123e4567+e89b-12d3-a456-426614174000".parse::<StreamUuid>(),
            Err(UuidParseError::Hyphen(8))
        );
        assert_eq!(
            "123e4567-e89b-12d3-a456-42661417400z".parse::<StreamUuid>(),
            Err(UuidParseError::Digit(35))
        );
    }

    #[test]
    fn v4_sets_version_and_variant() {
        let uuid = StreamUuid::new_v4();
        assert_eq!(uuid.0[6] >> 4, 4);
        assert_eq!(uuid.0[8] >> 6, 0b10);
        assert!(!uuid.is_nil());
        assert_ne!(uuid, StreamUuid::new_v4());
    }
}
