//! # Peppers and Salt Streams
//!
//! Every private channel owns a 32-byte secret pepper. Leaf salts are never
//! drawn from an RNG directly; they are expanded from the pepper so that the
//! owner can regenerate the exact same commitments from the document and the
//! pepper alone.
//!
//! ## Expansion
//!
//! Salts are produced in batches of four. Batch `n` is
//! `SHA512(pepper || uint32_be(n))` sliced into four 16-byte salts. Batches
//! are consumed strictly in order, so no salt is ever handed out twice.
//!
//! ## Security Invariant
//!
//! The pepper is a capability: anyone holding it can reproduce every salt of
//! the channel and open every derived proof. `Pepper` zeroizes on drop, its
//! `Debug` output is redacted, and it has no serde implementation, so it can
//! only leave the process through the channel's own wire bytes.

use std::collections::VecDeque;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use recseal_core::MerkleError;

use crate::sha256::sha512_concat;

/// Byte length of a pepper.
pub const PEPPER_LEN: usize = 32;

/// Byte length of a salt.
pub const SALT_LEN: usize = 16;

const SALTS_PER_BATCH: usize = 4;

/// A private channel's secret seed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Pepper([u8; PEPPER_LEN]);

impl Pepper {
    /// Draw a fresh pepper from the operating system RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; PEPPER_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap known pepper bytes (read back from a channel payload).
    pub fn from_bytes(bytes: [u8; PEPPER_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw pepper bytes.
    pub fn as_bytes(&self) -> &[u8; PEPPER_LEN] {
        &self.0
    }
}

impl PartialEq for Pepper {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Pepper {}

impl std::fmt::Debug for Pepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pepper(<redacted>)")
    }
}

/// A 16-byte per-leaf salt. Serialized as 32 hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Salt(#[serde(with = "hex")] [u8; SALT_LEN]);

impl Salt {
    /// Wrap raw salt bytes.
    pub fn new(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for Salt {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Salt({})", hex::encode(self.0))
    }
}

/// Deterministic salt generator for one channel.
#[derive(Debug)]
pub struct SaltStream {
    pepper: Pepper,
    batch: u32,
    exhausted: bool,
    pending: VecDeque<Salt>,
}

impl SaltStream {
    /// Start a stream at batch 0.
    pub fn new(pepper: Pepper) -> Self {
        Self {
            pepper,
            batch: 0,
            exhausted: false,
            pending: VecDeque::with_capacity(SALTS_PER_BATCH),
        }
    }

    /// The next unused salt.
    pub fn next_salt(&mut self) -> Result<Salt, MerkleError> {
        if self.pending.is_empty() {
            self.refill()?;
        }
        self.pending.pop_front().ok_or(MerkleError::SaltStreamExhausted)
    }

    fn refill(&mut self) -> Result<(), MerkleError> {
        if self.exhausted {
            return Err(MerkleError::SaltStreamExhausted);
        }
        let wide = sha512_concat(&[self.pepper.as_bytes(), &self.batch.to_be_bytes()]);
        for chunk in wide.chunks_exact(SALT_LEN) {
            let mut salt = [0u8; SALT_LEN];
            salt.copy_from_slice(chunk);
            self.pending.push_back(Salt(salt));
        }
        match self.batch.checked_add(1) {
            Some(next) => self.batch = next,
            None => self.exhausted = true,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn stream_is_deterministic_per_pepper() {
        let mut a = SaltStream::new(Pepper::from_bytes([7; 32]));
        let mut b = SaltStream::new(Pepper::from_bytes([7; 32]));
        for _ in 0..9 {
            assert_eq!(a.next_salt().unwrap(), b.next_salt().unwrap());
        }
    }

    #[test]
    fn first_batch_slices_sha512_of_pepper_and_counter() {
        let pepper = [3u8; 32];
        let wide = sha512_concat(&[&pepper, &0u32.to_be_bytes()]);
        let mut stream = SaltStream::new(Pepper::from_bytes(pepper));
        for i in 0..4 {
            let salt = stream.next_salt().unwrap();
            assert_eq!(salt.as_bytes().as_slice(), &wide[i * 16..(i + 1) * 16]);
        }
        let next_wide = sha512_concat(&[&pepper, &1u32.to_be_bytes()]);
        assert_eq!(stream.next_salt().unwrap().as_bytes().as_slice(), &next_wide[..16]);
    }

    #[test]
    fn salts_are_never_repeated() {
        let mut stream = SaltStream::new(Pepper::generate());
        let mut seen = HashSet::new();
        for _ in 0..256 {
            assert!(seen.insert(stream.next_salt().unwrap()));
        }
    }

    #[test]
    fn different_peppers_give_different_salts() {
        let mut a = SaltStream::new(Pepper::from_bytes([1; 32]));
        let mut b = SaltStream::new(Pepper::from_bytes([2; 32]));
        assert_ne!(a.next_salt().unwrap(), b.next_salt().unwrap());
    }

    #[test]
    fn pepper_debug_is_redacted() {
        let p = Pepper::from_bytes([0xaa; 32]);
        let shown = format!("{p:?}");
        assert!(!shown.contains("aa"));
    }

    #[test]
    fn salt_serializes_as_hex() {
        let salt = Salt::new([0x11; 16]);
        let json = serde_json::to_string(&salt).unwrap();
        assert_eq!(json, format!("\"{}\"", "11".repeat(16)));
        let back: Salt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, salt);
    }
}
