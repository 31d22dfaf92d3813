//! Key derivation: password + salt → 256-bit segment key
//!
//! The algorithm and its work factor travel in the container header, so the
//! set of algorithms is a closed enumeration and every parameter is bounded
//! before any hashing starts.

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{SymError, SymResult};
use crate::KEY_SIZE;

/// Upper bound on PBKDF2 iterations accepted from a header.
pub const MAX_PBKDF2_ITERATIONS: u32 = 35_000_000;

/// Argon2id time cost (passes), fixed for format version 1.
pub const ARGON2_TIME_COST: u32 = 3;

/// Argon2id lanes, fixed for format version 1.
pub const ARGON2_PARALLELISM: u32 = 4;

/// Argon2 refuses less than 8 KiB per lane.
pub const ARGON2_MIN_MEM_COST_KIB: u32 = 8 * ARGON2_PARALLELISM;

/// 1 GiB.
pub const ARGON2_MAX_MEM_COST_KIB: u32 = 1024 * 1024;

pub const MIN_SALT_LEN: u8 = 8;
pub const MAX_SALT_LEN: u8 = 64;
pub const DEFAULT_SALT_LEN: u8 = 32;

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;
pub const DEFAULT_ARGON2_MEM_COST_KIB: u32 = 65536;

/// Password hashing algorithms understood by format version 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// PBKDF2-HMAC-SHA256; the work factor is the iteration count.
    #[serde(rename = "pbkdf2-hmac-sha256")]
    Pbkdf2HmacSha256,
    /// Argon2id v0x13; the work factor is the memory cost in KiB.
    #[serde(rename = "argon2id")]
    Argon2id,
}

impl HashAlgorithm {
    pub fn id(self) -> u8 {
        match self {
            HashAlgorithm::Pbkdf2HmacSha256 => 1,
            HashAlgorithm::Argon2id => 2,
        }
    }

    pub fn from_id(id: u8) -> SymResult<Self> {
        match id {
            1 => Ok(HashAlgorithm::Pbkdf2HmacSha256),
            2 => Ok(HashAlgorithm::Argon2id),
            other => Err(SymError::format(format!(
                "unknown password hash algorithm id {other}"
            ))),
        }
    }

    fn work_factor_bounds(self) -> (u32, u32) {
        match self {
            HashAlgorithm::Pbkdf2HmacSha256 => (1, MAX_PBKDF2_ITERATIONS),
            HashAlgorithm::Argon2id => (ARGON2_MIN_MEM_COST_KIB, ARGON2_MAX_MEM_COST_KIB),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Pbkdf2HmacSha256 => f.write_str("PBKDF2-HMAC-SHA256"),
            HashAlgorithm::Argon2id => f.write_str("Argon2id"),
        }
    }
}

/// Hash metadata as stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashParams {
    pub algorithm: HashAlgorithm,
    /// Iteration count (PBKDF2) or memory cost in KiB (Argon2id)
    pub work_factor: u32,
    pub salt_len: u8,
}

impl HashParams {
    /// Check every field against its bound.
    ///
    /// A work factor above the hard maximum is a resource error; anything
    /// else out of range is a format error.
    pub fn validate(&self) -> SymResult<()> {
        let (min, max) = self.algorithm.work_factor_bounds();
        if self.work_factor > max {
            return Err(SymError::resource(format!(
                "{} work factor {} exceeds maximum {max}",
                self.algorithm, self.work_factor
            )));
        }
        if self.work_factor < min {
            return Err(SymError::format(format!(
                "{} work factor {} below minimum {min}",
                self.algorithm, self.work_factor
            )));
        }
        if !(MIN_SALT_LEN..=MAX_SALT_LEN).contains(&self.salt_len) {
            return Err(SymError::format(format!(
                "salt length {} outside {MIN_SALT_LEN}..={MAX_SALT_LEN}",
                self.salt_len
            )));
        }
        Ok(())
    }
}

/// A 256-bit key derived from a password.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the segment key for `password` and `salt`.
///
/// Deterministic and deliberately slow. `params` is validated first, and the
/// salt must have exactly the declared length.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8],
    params: &HashParams,
) -> SymResult<DerivedKey> {
    params.validate()?;
    if salt.len() != params.salt_len as usize {
        return Err(SymError::format(format!(
            "salt is {} bytes, header declares {}",
            salt.len(),
            params.salt_len
        )));
    }

    tracing::debug!(
        algorithm = %params.algorithm,
        work_factor = params.work_factor,
        "deriving key"
    );

    let mut key = [0u8; KEY_SIZE];
    match params.algorithm {
        HashAlgorithm::Pbkdf2HmacSha256 => {
            pbkdf2::pbkdf2_hmac::<Sha256>(
                password.expose_secret().as_bytes(),
                salt,
                params.work_factor,
                &mut key,
            );
        }
        HashAlgorithm::Argon2id => {
            let argon2_params = Params::new(
                params.work_factor,
                ARGON2_TIME_COST,
                ARGON2_PARALLELISM,
                Some(KEY_SIZE),
            )
            .map_err(|e| SymError::format(format!("invalid Argon2id params: {e}")))?;

            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);
            argon2
                .hash_password_into(password.expose_secret().as_bytes(), salt, &mut key)
                .map_err(|e| SymError::resource(format!("Argon2id KDF failed: {e}")))?;
        }
    }

    let derived = DerivedKey::from_bytes(key);
    key.zeroize();
    Ok(derived)
}
