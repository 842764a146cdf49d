//! Hashing for node and entry checksums
//!
//! The engine is polymorphic over a [`NodeHasher`]; BLAKE3 is the provided
//! implementation. Digests are opaque byte strings compared for equality
//! only, with the empty digest as a distinguished "no state" value.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque checksum produced by a [`NodeHasher`]
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(Bytes);

impl Digest {
    /// The distinguished empty digest
    pub const EMPTY: Digest = Digest(Bytes::new());

    /// Create a digest from raw bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Digest bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check if this is the empty digest
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert to a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A trait for producing checksums over node state
pub trait NodeHasher: Send + Sync {
    /// Digest a byte string
    fn digest(&self, data: &[u8]) -> Digest;
}

/// BLAKE3 hasher implementation
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Hasher;

impl NodeHasher for Blake3Hasher {
    fn digest(&self, data: &[u8]) -> Digest {
        Digest::new(blake3::hash(data).as_bytes().to_vec())
    }
}

/// Checksum of an ordered list of checksums.
///
/// The empty list maps to [`Digest::EMPTY`], so an empty node carries the
/// distinguished empty checksum rather than the hash of zero bytes.
pub fn digest_concat<H: NodeHasher + ?Sized>(hasher: &H, parts: &[Digest]) -> Digest {
    if parts.is_empty() {
        return Digest::EMPTY;
    }
    let mut buf = Vec::with_capacity(parts.iter().map(|p| p.as_bytes().len()).sum());
    for part in parts {
        buf.extend_from_slice(part.as_bytes());
    }
    hasher.digest(&buf)
}

/// Per-entry checksum binding a key to the checksum of its value
pub fn kv_digest<H: NodeHasher + ?Sized>(hasher: &H, key: &[u8], value_hash: &Digest) -> Digest {
    let mut buf = Vec::with_capacity(key.len() + value_hash.as_bytes().len());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value_hash.as_bytes());
    hasher.digest(&buf)
}
