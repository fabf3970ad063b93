//! `Ref`, the data-encryption key, and convergent key derivation (§4.1).

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use glfs_store::Cid;
use serde::{Deserialize, Serialize};

/// Size in bytes of a binary-marshalled [`Ref`] (`cid ‖ dek`).
pub const REF_SIZE: usize = 64;
pub const DEK_SIZE: usize = 32;

/// Data Encryption Key: `BLAKE3(key=salt, input=plaintext) -> 32 bytes`.
/// A pure function of plaintext and salt, so identical plaintexts under the
/// same salt always derive the same DEK (and therefore the same ciphertext
/// and CID) — convergent encryption.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dek([u8; DEK_SIZE]);

impl Dek {
    pub fn from_bytes(bytes: [u8; DEK_SIZE]) -> Self {
        Dek(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DEK_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Dek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Dek({})", hex::encode(&self.0[..4]))
    }
}

impl Serialize for Dek {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Dek {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; DEK_SIZE] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("dek must be 32 bytes"))?;
        Ok(Dek(arr))
    }
}

/// A reference to data in a content-addressed store: `(cid, dek)`.
/// Marshals to exactly [`REF_SIZE`] bytes: `cid ‖ dek`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Ref {
    pub cid: Cid,
    pub dek: Dek,
}

impl Ref {
    pub fn to_bytes(&self) -> [u8; REF_SIZE] {
        let mut out = [0u8; REF_SIZE];
        out[..32].copy_from_slice(self.cid.as_bytes());
        out[32..].copy_from_slice(self.dek.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < REF_SIZE {
            return None;
        }
        let mut cid_bytes = [0u8; 32];
        cid_bytes.copy_from_slice(&bytes[..32]);
        let mut dek_bytes = [0u8; 32];
        dek_bytes.copy_from_slice(&bytes[32..64]);
        Some(Ref {
            cid: Cid::from(cid_bytes),
            dek: Dek::from_bytes(dek_bytes),
        })
    }

    /// The cache key this ref's plaintext is stored under: `BLAKE3(cid‖dek)`.
    pub fn cache_key(&self) -> [u8; 32] {
        *blake3::hash(&self.to_bytes()).as_bytes()
    }
}

/// BLAKE3 keyed-hash XOF: absorbs `input` under key `salt`, derives
/// `out.len()` bytes into `out`. Used both for DEK derivation and for
/// deriving the per-role salts (`raw`, `index`) from a master salt.
pub fn derive_key(out: &mut [u8], salt: &[u8; 32], input: &[u8]) {
    let mut hasher = blake3::Hasher::new_keyed(salt);
    hasher.update(input);
    let mut xof = hasher.finalize_xof();
    xof.fill(out);
}

fn make_dek(salt: &[u8; 32], plaintext: &[u8]) -> Dek {
    let mut out = [0u8; DEK_SIZE];
    derive_key(&mut out, salt, plaintext);
    Dek(out)
}

/// XOR `data` in place with the ChaCha20 keystream under `key`, nonce fixed
/// at zero. Unauthenticated by design (§1 Non-goals, §4.1 rationale): the
/// DEK is unique per plaintext, so the (key, nonce) pair is used at most
/// once across a deduplicated corpus, and the CAS hash authenticates the
/// ciphertext instead of an AEAD tag.
fn crypto_xor(key: &Dek, data: &mut [u8]) {
    let nonce = [0u8; 12];
    let key = chacha20::Key::from_slice(&key.0);
    let nonce = chacha20::Nonce::from_slice(&nonce);
    let mut cipher = ChaCha20::new(key, nonce);
    cipher.apply_keystream(data);
}

/// Encrypt `plaintext` convergently under `salt`, returning the ciphertext
/// and the DEK it was encrypted with.
pub fn encrypt(salt: &[u8; 32], plaintext: &[u8]) -> (Vec<u8>, Dek) {
    let dek = make_dek(salt, plaintext);
    let mut ciphertext = plaintext.to_vec();
    crypto_xor(&dek, &mut ciphertext);
    (ciphertext, dek)
}

/// Decrypt `ciphertext` in place under `dek`. Symmetric with [`encrypt`]
/// because the stream cipher is its own inverse.
pub fn decrypt(dek: &Dek, ciphertext: &mut [u8]) {
    crypto_xor(dek, ciphertext);
}
