//! Per-segment AEAD sealing with a 96-bit big-endian counter nonce
//!
//! ```text
//! nonce = counter (12 bytes, big-endian)
//! AAD   = counter (12 bytes) || final flag (1 byte: 0 or 1)
//! ```
//!
//! The counter starts at zero and is advanced before every seal/open, so the
//! first segment uses counter 1. Folding the final flag into the AAD means a
//! stream cut at a segment boundary fails authentication instead of passing
//! as a shorter, valid file.

use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    ChaCha20Poly1305,
};
use serde::{Deserialize, Serialize};

use crate::error::{SymError, SymResult};
use crate::kdf::DerivedKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Largest value a 96-bit counter can hold.
const MAX_COUNTER: u128 = (1u128 << (NONCE_SIZE * 8)) - 1;

/// AEAD algorithms understood by format version 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    #[serde(rename = "aes256-gcm")]
    Aes256Gcm,
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl EncryptionAlgorithm {
    pub fn id(self) -> u8 {
        match self {
            EncryptionAlgorithm::Aes256Gcm => 1,
            EncryptionAlgorithm::ChaCha20Poly1305 => 2,
        }
    }

    pub fn from_id(id: u8) -> SymResult<Self> {
        match id {
            1 => Ok(EncryptionAlgorithm::Aes256Gcm),
            2 => Ok(EncryptionAlgorithm::ChaCha20Poly1305),
            other => Err(SymError::format(format!(
                "unknown encryption algorithm id {other}"
            ))),
        }
    }
}

impl std::fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncryptionAlgorithm::Aes256Gcm => f.write_str("AES-256-GCM"),
            EncryptionAlgorithm::ChaCha20Poly1305 => f.write_str("ChaCha20-Poly1305"),
        }
    }
}

/// Monotonic 96-bit segment counter. Never wraps: once exhausted every
/// further advance fails.
#[derive(Debug, Default)]
pub struct SegmentCounter {
    value: u128,
}

impl SegmentCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn starting_at(value: u128) -> Self {
        Self { value }
    }

    /// Advance and return the new value as 12 big-endian bytes.
    pub fn advance(&mut self) -> SymResult<[u8; NONCE_SIZE]> {
        if self.value >= MAX_COUNTER {
            return Err(SymError::resource("segment counter overflowed"));
        }
        self.value += 1;
        Ok(self.to_bytes())
    }

    pub fn value(&self) -> u128 {
        self.value
    }

    fn to_bytes(&self) -> [u8; NONCE_SIZE] {
        let wide = self.value.to_be_bytes();
        let mut out = [0u8; NONCE_SIZE];
        out.copy_from_slice(&wide[wide.len() - NONCE_SIZE..]);
        out
    }
}

enum Aead {
    Aes256Gcm(Box<Aes256Gcm>),
    ChaCha20Poly1305(ChaCha20Poly1305),
}

/// One key, one counter: seals or opens the segments of a single stream.
pub struct SegmentCipher {
    aead: Aead,
    counter: SegmentCounter,
}

impl SegmentCipher {
    pub fn new(algorithm: EncryptionAlgorithm, key: &DerivedKey) -> Self {
        let aead = match algorithm {
            EncryptionAlgorithm::Aes256Gcm => {
                Aead::Aes256Gcm(Box::new(Aes256Gcm::new(key.as_bytes().into())))
            }
            EncryptionAlgorithm::ChaCha20Poly1305 => {
                Aead::ChaCha20Poly1305(ChaCha20Poly1305::new(key.as_bytes().into()))
            }
        };
        Self {
            aead,
            counter: SegmentCounter::new(),
        }
    }

    /// Number of segments sealed or opened so far.
    pub fn segments(&self) -> u128 {
        self.counter.value()
    }

    /// Encrypt `buf` in place, appending the tag.
    pub fn seal_in_place(&mut self, buf: &mut Vec<u8>, last: bool) -> SymResult<()> {
        let counter = self.counter.advance()?;
        let aad = build_aad(&counter, last);
        let nonce = GenericArray::from_slice(&counter);

        match &self.aead {
            Aead::Aes256Gcm(cipher) => cipher.encrypt_in_place(nonce, &aad, buf),
            Aead::ChaCha20Poly1305(cipher) => cipher.encrypt_in_place(nonce, &aad, buf),
        }
        .map_err(|_| SymError::resource("segment encryption failed"))
    }

    /// Verify and decrypt `buf` in place, stripping the tag.
    pub fn open_in_place(&mut self, buf: &mut Vec<u8>, last: bool) -> SymResult<()> {
        if buf.len() < TAG_SIZE {
            return Err(SymError::format(format!(
                "segment of {} bytes is shorter than the {TAG_SIZE}-byte tag",
                buf.len()
            )));
        }
        let counter = self.counter.advance()?;
        let aad = build_aad(&counter, last);
        let nonce = GenericArray::from_slice(&counter);

        match &self.aead {
            Aead::Aes256Gcm(cipher) => cipher.decrypt_in_place(nonce, &aad, buf),
            Aead::ChaCha20Poly1305(cipher) => cipher.decrypt_in_place(nonce, &aad, buf),
        }
        .map_err(|_| SymError::Authentication)
    }
}

/// AAD: counter (12 bytes BE) || final flag
fn build_aad(counter: &[u8; NONCE_SIZE], last: bool) -> [u8; NONCE_SIZE + 1] {
    let mut aad = [0u8; NONCE_SIZE + 1];
    aad[..NONCE_SIZE].copy_from_slice(counter);
    aad[NONCE_SIZE] = u8::from(last);
    aad
}
