//! Block identifier type.

use std::fmt;

/// A 32-byte block identifier.
///
/// Safe to use as a map key, and ordered so collections of IDs iterate
/// deterministically. Consensus arbitrates between conflicting sibling
/// blocks along the bits of their IDs, so the type exposes bit indexing
/// in a fixed order: bit `i` is bit `i % 8` of byte `i / 8`, i.e. byte 0
/// first, least-significant bit first within a byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId([u8; 32]);

impl BlockId {
    /// Size of an ID in bytes.
    pub const BYTES: usize = 32;

    /// Number of addressable bits.
    pub const NUM_BITS: usize = 256;

    /// Zero ID (all bytes are 0x00). Conventionally the genesis parent.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create an ID from raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create an ID by hashing arbitrary bytes with Blake3.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let hash = blake3::hash(bytes);
        Self(*hash.as_bytes())
    }

    /// Parse an ID from a hex string.
    pub fn from_hex(hex: &str) -> Result<Self, HexError> {
        if hex.len() != 64 {
            return Err(HexError::InvalidLength {
                expected: 64,
                actual: hex.len(),
            });
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex, &mut bytes).map_err(|_| HexError::InvalidHex)?;

        Ok(Self(bytes))
    }

    /// Convert the ID to a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the bytes as a slice reference.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Get bit `i` of this ID (0 or 1).
    ///
    /// # Panics
    ///
    /// Panics if `i >= Self::NUM_BITS`.
    pub fn bit(&self, i: usize) -> u8 {
        assert!(i < Self::NUM_BITS, "bit index {i} out of range");
        (self.0[i / 8] >> (i % 8)) & 1
    }

    /// Find the lowest bit index at which two IDs differ.
    ///
    /// Returns `None` when the IDs are equal.
    pub fn first_difference(&self, other: &BlockId) -> Option<usize> {
        for (i, (a, b)) in self.0.iter().zip(other.0.iter()).enumerate() {
            let diff = a ^ b;
            if diff != 0 {
                return Some(i * 8 + diff.trailing_zeros() as usize);
            }
        }
        None
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "BlockId({}..{})", &hex[..8], &hex[56..])
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Errors that can occur when parsing hex strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    /// Invalid hex string length.
    #[error("Invalid hex length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Invalid hex characters.
    #[error("Invalid hex string")]
    InvalidHex,
}
