//! Ledger key and signature types.
//!
//! Keys are 32-byte values rendered in base58, the text form every ledger
//! tool and explorer expects. Account addresses, mints and program ids all
//! share this type.

use crate::error::{DispatchError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of a ledger key in bytes.
pub const PUBKEY_BYTES: usize = 32;

/// Length of a transaction signature in bytes.
pub const SIGNATURE_BYTES: usize = 64;

/// A 32-byte ledger key or account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Pubkey([u8; PUBKEY_BYTES]);

impl Pubkey {
    /// Creates a key from raw bytes.
    pub const fn new_from_array(bytes: [u8; PUBKEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Creates a key from a byte slice, which must be exactly 32 bytes.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; PUBKEY_BYTES] = bytes.try_into().map_err(|_| {
            DispatchError::invalid_input(format!(
                "Key must be {} bytes, got {}",
                PUBKEY_BYTES,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Generates a random key. Useful for throwaway targets and tests.
    pub fn new_unique() -> Self {
        Self(rand::random())
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBKEY_BYTES] {
        &self.0
    }

    /// Returns the raw key bytes as a slice, for use as a derivation seed.
    pub fn as_ref_seed(&self) -> &[u8] {
        &self.0
    }

    /// Returns the base58 string form.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Returns a short form of the key for logs (first 8 base58 chars).
    pub fn short(&self) -> String {
        let full = self.to_base58();
        full[..8.min(full.len())].to_string()
    }
}

impl FromStr for Pubkey {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| DispatchError::invalid_input(format!("Invalid base58 key '{}': {}", s, e)))?;
        Self::try_from_slice(&bytes)
    }
}

impl AsRef<[u8]> for Pubkey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self.to_base58())
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl Serialize for Pubkey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A 64-byte transaction signature, which doubles as the transaction id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_BYTES]);

impl Signature {
    /// Creates a signature from raw bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_BYTES]) -> Self {
        Self(bytes)
    }

    /// Returns the raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_BYTES] {
        &self.0
    }

    /// Returns the base58 string form.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; SIGNATURE_BYTES])
    }
}

impl FromStr for Signature {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s).into_vec().map_err(|e| {
            DispatchError::invalid_input(format!("Invalid base58 signature: {}", e))
        })?;
        let arr: [u8; SIGNATURE_BYTES] = bytes.as_slice().try_into().map_err(|_| {
            DispatchError::invalid_input(format!(
                "Signature must be {} bytes, got {}",
                SIGNATURE_BYTES,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = self.to_base58();
        write!(f, "Signature({}...)", &full[..16.min(full.len())])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubkey_base58_roundtrip() {
        let key = Pubkey::new_unique();
        let parsed: Pubkey = key.to_base58().parse().unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn test_system_program_is_all_zero() {
        let key: Pubkey = "11111111111111111111111111111111".parse().unwrap();
        assert_eq!(key, Pubkey::default());
    }

    #[test]
    fn test_pubkey_rejects_wrong_length() {
        assert!(Pubkey::try_from_slice(&[1u8; 31]).is_err());
        assert!("abc".parse::<Pubkey>().is_err());
    }

    #[test]
    fn test_pubkey_serde_as_string() {
        let key = Pubkey::new_from_array([7u8; 32]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.to_base58()));
        let back: Pubkey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_signature_display() {
        let sig = Signature::from_bytes([9u8; 64]);
        let parsed: Signature = sig.to_string().parse().unwrap();
        assert_eq!(sig, parsed);
    }
}
