//! # Secret and Hash Value Objects
//!
//! The swap preimage and the 20-byte double-hash used to lock it.
//!
//! ## Security
//!
//! Preimages are sensitive material that must not linger in memory after
//! use. `SwapSecret` zeroizes on drop, hides its value from `Debug`, and
//! serializes as hex only where a record legitimately carries it (the
//! settlement request and the post-reveal secret message).

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A swap preimage: 32 random bytes whose double-hash is the hash-lock.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SwapSecret {
    inner: [u8; 32],
}

impl SwapSecret {
    /// Wrap raw preimage bytes.
    #[must_use]
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { inner: bytes }
    }

    /// Copy from a slice; `None` unless it is exactly 32 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 32 {
            return None;
        }
        let mut inner = [0u8; 32];
        inner.copy_from_slice(slice);
        Some(Self { inner })
    }

    /// Borrow the preimage bytes. Use immediately and let go.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.inner
    }

    /// Copy the preimage out for an on-chain reveal.
    #[must_use]
    pub fn expose(&self) -> [u8; 32] {
        self.inner
    }
}

impl fmt::Debug for SwapSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the actual preimage
        f.write_str("SwapSecret(***)")
    }
}

impl Serialize for SwapSecret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.inner))
    }
}

impl<'de> Deserialize<'de> for SwapSecret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::from_slice(&bytes).ok_or_else(|| serde::de::Error::custom("invalid secret length"))
    }
}

/// A 20-byte RIPEMD160-sized digest.
///
/// Used both for hash-locks (`RIPEMD160(SHA256(secret))`) and for the
/// pubkey hashes that parties supply for script construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash160([u8; 20]);

impl Hash160 {
    /// Wrap raw digest bytes.
    #[must_use]
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Copy from a slice; `None` unless it is exactly 20 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 20 {
            return None;
        }
        let mut inner = [0u8; 20];
        inner.copy_from_slice(slice);
        Some(Self(inner))
    }

    /// The raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Debug for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash160({})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for Hash160 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Hash160 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Self::from_slice(&bytes).ok_or_else(|| serde::de::Error::custom("invalid digest length"))
    }
}
