//! SHA-256 hashing with strong types.
//!
//! Two hash types live here: [`Sha256Hash`], the digest of a single canonical
//! string, and [`ManifestHash`], the 32-byte XOR accumulator over message id
//! hashes. XOR is commutative and self-inverse, so insertions and removals
//! are O(1) and add/remove order never affects the accumulated value.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::CoreError;

/// A 32-byte SHA-256 hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sha256Hash(pub [u8; 32]);

impl Sha256Hash {
    /// Compute the SHA-256 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(digest.into())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lower-case hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|_| CoreError::InvalidHex(s.len()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidHex(s.len()))?;
        Ok(Self(arr))
    }

    /// The zero hash (sentinel value).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Sha256Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Sha256Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// The set-valued manifest hash: a 32-byte XOR accumulator.
///
/// Equals the XOR of `id_hash(message_id)` over every message in the set.
/// Toggling the same hash twice restores the previous value, which is what
/// makes O(1) removal possible.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ManifestHash([u8; 32]);

impl ManifestHash {
    /// The hash of the empty set: 32 zero bytes.
    pub const EMPTY: Self = Self([0u8; 32]);

    /// XOR a member hash in (or out: the operation is its own inverse).
    pub fn toggle(&mut self, hash: &Sha256Hash) {
        for (acc, byte) in self.0.iter_mut().zip(hash.0.iter()) {
            *acc ^= byte;
        }
    }

    /// Get the raw accumulator bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lower-case hex, the wire representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ManifestHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManifestHash({})", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vectors() {
        assert_eq!(
            Sha256Hash::hash(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            Sha256Hash::hash(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hex_roundtrip() {
        let h = Sha256Hash::hash(b"roundtrip");
        let recovered = Sha256Hash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, recovered);
    }

    #[test]
    fn test_from_hex_rejects_bad_length() {
        assert!(Sha256Hash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_manifest_hash_empty_is_zero() {
        assert_eq!(
            ManifestHash::EMPTY.to_hex(),
            "0".repeat(64),
        );
    }

    #[test]
    fn test_toggle_is_self_inverse() {
        let mut acc = ManifestHash::EMPTY;
        let a = Sha256Hash::hash(b"m1");
        let b = Sha256Hash::hash(b"m2");

        acc.toggle(&a);
        let with_a = acc;
        acc.toggle(&b);
        assert_ne!(acc, with_a);
        acc.toggle(&b);
        assert_eq!(acc, with_a);
        acc.toggle(&a);
        assert_eq!(acc, ManifestHash::EMPTY);
    }

    #[test]
    fn test_toggle_commutes() {
        let a = Sha256Hash::hash(b"m1");
        let b = Sha256Hash::hash(b"m2");
        let c = Sha256Hash::hash(b"m3");

        let mut fwd = ManifestHash::EMPTY;
        fwd.toggle(&a);
        fwd.toggle(&b);
        fwd.toggle(&c);

        let mut rev = ManifestHash::EMPTY;
        rev.toggle(&c);
        rev.toggle(&a);
        rev.toggle(&b);

        assert_eq!(fwd, rev);
    }
}
