// SPDX-License-Identifier: MIT OR Apache-2.0
//! Event, trace, and span identifiers.
//!
//! All three are fixed-size opaque byte strings that travel hex-encoded on
//! the wire. The all-zero value is reserved as "none" and never generated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Error returned when a hex identifier fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id: {input:?}")]
pub struct ParseIdError {
    /// Which identifier type was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub input: String,
}

fn decode_hex<const N: usize>(kind: &'static str, s: &str) -> Result<[u8; N], ParseIdError> {
    let err = || ParseIdError {
        kind,
        input: s.to_owned(),
    };
    if s.len() != N * 2 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(err());
    }
    let mut out = [0u8; N];
    for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16).ok_or_else(err)?;
        let lo = (chunk[1] as char).to_digit(16).ok_or_else(err)?;
        out[i] = (hi as u8) << 4 | lo as u8;
    }
    Ok(out)
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for b in bytes {
        write!(f, "{b:02x}")?;
    }
    Ok(())
}

macro_rules! hex_id {
    ($(#[$doc:meta])* $name:ident, $len:expr, $kind:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// The reserved all-zero "none" value.
            pub const NIL: Self = Self([0; $len]);

            /// Whether this is the reserved all-zero value.
            #[must_use]
            pub fn is_nil(&self) -> bool {
                self.0 == [0; $len]
            }

            /// Raw bytes.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write_hex(f, &self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_hex::<$len>($kind, s).map(Self)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_id!(
    /// Identifier of a captured event: 16 random bytes, rendered as 32
    /// lowercase hex characters without dashes.
    EventId,
    16,
    "event"
);

hex_id!(
    /// Identifier shared by every span of one distributed trace.
    TraceId,
    16,
    "trace"
);

hex_id!(
    /// Identifier of a single span within a trace.
    SpanId,
    8,
    "span"
);

impl EventId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }
}

impl TraceId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }
}

impl SpanId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        let bytes = Uuid::new_v4().into_bytes();
        let mut out = [0u8; 8];
        out.copy_from_slice(&bytes[..8]);
        Self(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_is_32_lowercase_hex() {
        let id = EventId::new().to_string();
        assert_eq!(id.len(), 32);
        assert!(id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        assert!(!id.contains('-'));
    }

    #[test]
    fn trace_and_span_id_lengths() {
        assert_eq!(TraceId::new().to_string().len(), 32);
        assert_eq!(SpanId::new().to_string().len(), 16);
    }

    #[test]
    fn successive_ids_are_distinct() {
        let a = EventId::new();
        let b = EventId::new();
        let c = EventId::new();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn nil_is_reserved() {
        assert!(EventId::NIL.is_nil());
        assert!(TraceId::NIL.is_nil());
        assert!(!TraceId::new().is_nil());
        assert_eq!(TraceId::default(), TraceId::NIL);
    }

    #[test]
    fn roundtrip_from_str() {
        let id = SpanId::new();
        let parsed: SpanId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!("xyz".parse::<SpanId>().is_err());
        assert!("b72fa28504b072".parse::<SpanId>().is_err()); // too short
        assert!("b72fa28504b07285ff".parse::<SpanId>().is_err()); // too long
        let err = "nothex".parse::<TraceId>().unwrap_err();
        assert_eq!(err.kind, "trace");
    }

    #[test]
    fn serde_as_hex_string() {
        let id: TraceId = "bc6d53f15eb88f4320054569b8c553d4".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""bc6d53f15eb88f4320054569b8c553d4""#);
        let back: TraceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
