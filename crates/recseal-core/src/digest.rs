//! # 32-Byte Digests
//!
//! `Hash32` is the single digest type for leaf commitments, Merkle nodes,
//! witnesses and published channel roots. It orders bytewise, which is the
//! order the committing merklizer sorts leaves in.
//!
//! On the wire and in proof documents a digest is 64 lowercase hex chars.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MerkleError;

/// Byte length of a [`Hash32`].
pub const HASH_LEN: usize = 32;

/// A 32-byte digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash32([u8; HASH_LEN]);

impl Hash32 {
    /// The all-zero digest, used as the root of an empty tree.
    pub const ZERO: Hash32 = Hash32([0u8; HASH_LEN]);

    /// Wrap raw digest bytes.
    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Copy a digest out of a slice produced by a hasher.
    ///
    /// Returns `None` unless the slice is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Render as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse 64 hex chars.
    pub fn from_hex(s: &str) -> Result<Self, MerkleError> {
        let mut out = [0u8; HASH_LEN];
        hex::decode_to_slice(s.trim(), &mut out)
            .map_err(|e| MerkleError::WitnessEncoding(format!("invalid digest hex: {e}")))?;
        Ok(Self(out))
    }

    /// Split a hex string of concatenated digests.
    ///
    /// The empty string decodes to no digests.
    pub fn list_from_hex(s: &str) -> Result<Vec<Self>, MerkleError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| MerkleError::WitnessEncoding(format!("invalid hex: {e}")))?;
        if bytes.len() % HASH_LEN != 0 {
            return Err(MerkleError::WitnessEncoding(format!(
                "{} bytes is not a multiple of {HASH_LEN}",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(HASH_LEN)
            .filter_map(Self::from_slice)
            .collect())
    }

    /// Concatenate digests into one hex string.
    pub fn list_to_hex(list: &[Self]) -> String {
        list.iter().map(Self::to_hex).collect()
    }
}

impl AsRef<[u8]> for Hash32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let h = Hash32::new([0xab; 32]);
        assert_eq!(h.to_hex(), "ab".repeat(32));
        assert_eq!(Hash32::from_hex(&h.to_hex()).unwrap(), h);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(Hash32::from_hex("abcd").is_err());
        assert!(Hash32::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn list_hex_splits_on_32_byte_boundaries() {
        let a = Hash32::new([1; 32]);
        let b = Hash32::new([2; 32]);
        let joined = Hash32::list_to_hex(&[a, b]);
        assert_eq!(joined.len(), 128);
        assert_eq!(Hash32::list_from_hex(&joined).unwrap(), vec![a, b]);
        assert!(Hash32::list_from_hex("").unwrap().is_empty());
        assert!(Hash32::list_from_hex(&"00".repeat(33)).is_err());
    }

    #[test]
    fn serde_uses_hex_strings() {
        let h = Hash32::new([0x0f; 32]);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", "0f".repeat(32)));
        let back: Hash32 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn ordering_is_bytewise() {
        let mut low = [0u8; 32];
        low[31] = 0xff;
        let mut high = [0u8; 32];
        high[0] = 0x01;
        assert!(Hash32::new(low) < Hash32::new(high));
    }
}
