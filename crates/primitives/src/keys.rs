//! Fixed-size key types.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::KeyError;

/// Signing identity of a participant (secp256k1 address).
pub use alloy_primitives::Address as SignerAddress;

macro_rules! key_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(B256);

        impl $name {
            /// Creates a key from raw bytes.
            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(B256::new(bytes))
            }

            /// Creates a key from a byte slice, checking its length.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
                let array = <[u8; 32]>::try_from(bytes)
                    .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
                Ok(Self::new(array))
            }

            /// Raw key bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0.0
            }

            /// Returns true if every byte is zero.
            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }

            /// First five hex characters, used as a log prefix.
            pub fn short(&self) -> String {
                let mut hex = hex::encode(self.as_bytes());
                hex.truncate(5);
                hex
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self::new(bytes)
            }
        }

        impl From<B256> for $name {
            fn from(value: B256) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.as_bytes()))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.short())
            }
        }

        impl FromStr for $name {
            type Err = KeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
                Self::from_slice(&bytes)
            }
        }
    };
}

key_type!(
    /// Transport key of a peer, used to address it on the session fabric.
    PeerKey
);

key_type!(
    /// Public key of an append-only feed.
    FeedKey
);

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_hex_roundtrip() {
        let key = PeerKey::new([0xab; 32]);
        let parsed: PeerKey = key.to_string().parse().unwrap();
        assert_eq!(key, parsed);

        let prefixed: PeerKey = format!("0x{key}").parse().unwrap();
        assert_eq!(key, prefixed);
    }

    #[test]
    fn test_rejects_short_slice() {
        assert_matches!(FeedKey::from_slice(&[1, 2, 3]), Err(KeyError::InvalidLength(3)));
    }

    #[test]
    fn test_short_prefix() {
        let key = PeerKey::new([0xab; 32]);
        assert_eq!(key.short(), "ababa");
        assert_eq!(format!("{key:?}"), "PeerKey(ababa)");
    }
}
