use serde::{Deserialize, Serialize};

use crate::error::SymResult;
use crate::format::{EncryptionParams, Header, DEFAULT_SEGMENT_SIZE};
use crate::kdf::{
    HashAlgorithm, HashParams, DEFAULT_ARGON2_MEM_COST_KIB, DEFAULT_PBKDF2_ITERATIONS,
    DEFAULT_SALT_LEN,
};
use crate::segment::EncryptionAlgorithm;

/// Top-level configuration (loaded from sym.toml by the CLI)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SymConfig {
    pub encrypt: EncryptConfig,
    pub log: LogConfig,
}

/// Parameters for new containers. Decryption never consults this: it uses
/// whatever the container header declares.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptConfig {
    /// Password hash: "argon2id" (default) or "pbkdf2-hmac-sha256"
    pub hash_algorithm: HashAlgorithm,
    /// PBKDF2 iteration count (default: 600000)
    pub pbkdf2_iterations: u32,
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Salt length in bytes (default: 32)
    pub salt_len: u8,
    /// AEAD: "chacha20-poly1305" (default) or "aes256-gcm"
    pub encryption_algorithm: EncryptionAlgorithm,
    /// Encrypted segment size in bytes, tag included (default: 1 MiB)
    pub segment_size: u32,
    /// Emit ASCII-armored output instead of binary
    pub armor: bool,
}

impl Default for EncryptConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Argon2id,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            argon2_mem_cost_kib: DEFAULT_ARGON2_MEM_COST_KIB,
            salt_len: DEFAULT_SALT_LEN,
            encryption_algorithm: EncryptionAlgorithm::ChaCha20Poly1305,
            segment_size: DEFAULT_SEGMENT_SIZE,
            armor: false,
        }
    }
}

impl EncryptConfig {
    pub fn hash_params(&self) -> HashParams {
        let work_factor = match self.hash_algorithm {
            HashAlgorithm::Pbkdf2HmacSha256 => self.pbkdf2_iterations,
            HashAlgorithm::Argon2id => self.argon2_mem_cost_kib,
        };
        HashParams {
            algorithm: self.hash_algorithm,
            work_factor,
            salt_len: self.salt_len,
        }
    }

    pub fn encryption_params(&self) -> EncryptionParams {
        EncryptionParams {
            algorithm: self.encryption_algorithm,
            segment_size: self.segment_size,
        }
    }

    /// The header new containers will carry, validated.
    pub fn header(&self) -> SymResult<Header> {
        let header = Header::new(self.hash_params(), self.encryption_params());
        header.validate()?;
        Ok(header)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "text" or "json"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}
