//! The content identifier used by GLFS (BLAKE3, 32 bytes).
//!
//! Implementation lifted from Iroh (MIT OR Apache-2.0)
//! https://github.com/n0-computer/iroh-blobs/blob/main/src/hash.rs

use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

/// A 32-byte content identifier. The default hash function is BLAKE3-256;
/// stores are free to use a different hash as long as `Cid` stays 32 bytes.
#[derive(Clone, Copy, Hash, PartialEq, Eq)]
pub struct Cid(blake3::Hash);

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cid").field(&DD(self.to_hex())).finish()
    }
}

struct DD<T: fmt::Display>(T);

impl<T: fmt::Display> fmt::Debug for DD<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Cid {
    /// The CID of the empty byte range (`b""`).
    pub const EMPTY: Cid = Cid::from_bytes([
        175, 19, 73, 185, 245, 249, 161, 166, 160, 64, 77, 234, 54, 220, 201, 73, 155, 203, 37,
        201, 173, 193, 18, 183, 204, 154, 147, 202, 228, 31, 50, 98,
    ]);

    /// The all-zero CID. Index slots use this to mean "empty" (§4.2); a real
    /// CID of all zero bytes can never occur in practice.
    pub const ZERO: Cid = Cid::from_bytes([0u8; 32]);

    /// Hash `buf` with BLAKE3 to produce its CID.
    pub fn new(buf: impl AsRef<[u8]>) -> Self {
        Cid(blake3::hash(buf.as_ref()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(blake3::Hash::from_bytes(bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    pub fn fmt_short(&self) -> String {
        data_encoding::HEXLOWER.encode(&self.as_bytes()[..5])
    }

    pub fn is_zero(&self) -> bool {
        self.as_bytes() == &[0u8; 32]
    }
}

impl AsRef<[u8]> for Cid {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Borrow<[u8]> for Cid {
    fn borrow(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Borrow<[u8; 32]> for Cid {
    fn borrow(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl From<Cid> for blake3::Hash {
    fn from(value: Cid) -> Self {
        value.0
    }
}

impl From<blake3::Hash> for Cid {
    fn from(value: blake3::Hash) -> Self {
        Cid(value)
    }
}

impl From<[u8; 32]> for Cid {
    fn from(value: [u8; 32]) -> Self {
        Cid(blake3::Hash::from(value))
    }
}

impl From<Cid> for [u8; 32] {
    fn from(value: Cid) -> Self {
        *value.as_bytes()
    }
}

impl From<&[u8; 32]> for Cid {
    fn from(value: &[u8; 32]) -> Self {
        Cid(blake3::Hash::from(*value))
    }
}

impl PartialOrd for Cid {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cid {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Serialises as hex, matching `Dek`'s wire form (§6.2: "DEK and CID
/// serialise as hex or a URL-safe base64 alphabet"; this crate picks hex).
impl Serialize for Cid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("cid must be 32 bytes"))?;
        Ok(Cid::from_bytes(arr))
    }
}
