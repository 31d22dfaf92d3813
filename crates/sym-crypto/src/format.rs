//! Container header
//!
//! ```text
//! [4 bytes: magic 0x80 "sym"]
//! [1 byte : version]
//! [1 byte : hash algorithm id]
//! [4 bytes: work factor, big-endian]
//! [1 byte : salt length]
//! [1 byte : encryption algorithm id]
//! [4 bytes: segment size, big-endian]
//! ```
//!
//! The salt follows immediately, then the sealed segments. Every field is
//! checked before the caller gets a `Header`, so nothing expensive happens
//! on behalf of a hostile header.

use std::io::{self, Read, Write};

use crate::error::{SymError, SymResult};
use crate::kdf::{HashAlgorithm, HashParams};
use crate::segment::EncryptionAlgorithm;
use crate::TAG_SIZE;

pub const MAGIC: [u8; 4] = *b"\x80sym";

pub const FORMAT_VERSION: u8 = 1;

pub const HEADER_LEN: usize = 16;

/// A segment must hold the tag plus at least 16 bytes of plaintext.
pub const MIN_SEGMENT_SIZE: u32 = 2 * TAG_SIZE as u32;

/// 16 MiB; bounds the reader's buffer.
pub const MAX_SEGMENT_SIZE: u32 = 16 * 1024 * 1024;

pub const DEFAULT_SEGMENT_SIZE: u32 = 1024 * 1024;

/// Encryption metadata as stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionParams {
    pub algorithm: EncryptionAlgorithm,
    /// Ciphertext bytes per full segment, tag included
    pub segment_size: u32,
}

impl EncryptionParams {
    pub fn validate(&self) -> SymResult<()> {
        if self.segment_size > MAX_SEGMENT_SIZE {
            return Err(SymError::resource(format!(
                "segment size {} exceeds maximum {MAX_SEGMENT_SIZE}",
                self.segment_size
            )));
        }
        if self.segment_size < MIN_SEGMENT_SIZE {
            return Err(SymError::format(format!(
                "segment size {} below minimum {MIN_SEGMENT_SIZE}",
                self.segment_size
            )));
        }
        Ok(())
    }

    /// Plaintext bytes carried by one full segment.
    pub fn plaintext_capacity(&self) -> usize {
        self.segment_size as usize - TAG_SIZE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub hash: HashParams,
    pub encryption: EncryptionParams,
}

impl Header {
    pub fn new(hash: HashParams, encryption: EncryptionParams) -> Self {
        Self {
            version: FORMAT_VERSION,
            hash,
            encryption,
        }
    }

    pub fn validate(&self) -> SymResult<()> {
        if self.version != FORMAT_VERSION {
            return Err(SymError::format(format!(
                "unsupported format version {}",
                self.version
            )));
        }
        self.hash.validate()?;
        self.encryption.validate()
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC);
        out[4] = self.version;
        out[5] = self.hash.algorithm.id();
        out[6..10].copy_from_slice(&self.hash.work_factor.to_be_bytes());
        out[10] = self.hash.salt_len;
        out[11] = self.encryption.algorithm.id();
        out[12..16].copy_from_slice(&self.encryption.segment_size.to_be_bytes());
        out
    }

    /// Parse and validate a header.
    pub fn from_bytes(buf: &[u8; HEADER_LEN]) -> SymResult<Self> {
        if buf[0..4] != MAGIC {
            return Err(SymError::format("bad magic bytes"));
        }
        let version = buf[4];
        if version != FORMAT_VERSION {
            return Err(SymError::format(format!(
                "unsupported format version {version}"
            )));
        }

        let header = Header {
            version,
            hash: HashParams {
                algorithm: HashAlgorithm::from_id(buf[5])?,
                work_factor: u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]),
                salt_len: buf[10],
            },
            encryption: EncryptionParams {
                algorithm: EncryptionAlgorithm::from_id(buf[11])?,
                segment_size: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            },
        };
        header.validate()?;
        Ok(header)
    }

    /// Validate, then write the header.
    pub fn write_to<W: Write>(&self, mut w: W) -> SymResult<()> {
        self.validate()?;
        w.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Read exactly [`HEADER_LEN`] bytes and parse them.
    pub fn read_from<R: Read>(mut r: R) -> SymResult<Self> {
        let mut buf = [0u8; HEADER_LEN];
        read_exact_or_truncated(&mut r, &mut buf, "header")?;
        Self::from_bytes(&buf)
    }
}

/// Parse and validate the header at the start of `bytes`.
pub fn validate_header(bytes: &[u8]) -> SymResult<Header> {
    let buf: &[u8; HEADER_LEN] = bytes
        .get(..HEADER_LEN)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            SymError::format(format!(
                "truncated header: {} bytes (need {HEADER_LEN})",
                bytes.len()
            ))
        })?;
    Header::from_bytes(buf)
}

/// `read_exact` that reports a short stream as a format error.
pub(crate) fn read_exact_or_truncated<R: Read>(
    r: &mut R,
    buf: &mut [u8],
    what: &str,
) -> SymResult<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SymError::format(format!("truncated {what}"))
        } else {
            SymError::from(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::{ARGON2_MAX_MEM_COST_KIB, MAX_PBKDF2_ITERATIONS};

    fn sample_header() -> Header {
        Header::new(
            HashParams {
                algorithm: HashAlgorithm::Pbkdf2HmacSha256,
                work_factor: 100_000,
                salt_len: 32,
            },
            EncryptionParams {
                algorithm: EncryptionAlgorithm::ChaCha20Poly1305,
                segment_size: DEFAULT_SEGMENT_SIZE,
            },
        )
    }

    #[test]
    fn test_header_layout() {
        let bytes = sample_header().to_bytes();
        assert_eq!(
            bytes,
            [
                0x80, b's', b'y', b'm', // magic
                1,    // version
                1,    // PBKDF2-HMAC-SHA256
                0x00, 0x01, 0x86, 0xA0, // 100_000
                32,   // salt length
                2,    // ChaCha20-Poly1305
                0x00, 0x10, 0x00, 0x00, // 1 MiB
            ]
        );
    }

    #[test]
    fn test_header_parse_roundtrip() {
        let header = sample_header();
        assert_eq!(Header::from_bytes(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    fn test_read_from_consumes_exactly_header() {
        let mut data = sample_header().to_bytes().to_vec();
        data.extend_from_slice(b"salt follows");
        let mut cursor = std::io::Cursor::new(data);

        Header::read_from(&mut cursor).unwrap();
        assert_eq!(cursor.position(), HEADER_LEN as u64);
    }

    #[test]
    fn test_truncated_header() {
        let bytes = sample_header().to_bytes();
        for len in [0, 1, 4, HEADER_LEN - 1] {
            assert!(validate_header(&bytes[..len]).unwrap_err().is_format(), "len {len}");
            let err = Header::read_from(&bytes[..len]).unwrap_err();
            assert!(err.is_format(), "len {len}: {err}");
        }
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample_header().to_bytes();
        bytes[1] = b'S';
        assert!(validate_header(&bytes).unwrap_err().is_format());
    }

    #[test]
    fn test_unsupported_version() {
        for version in [0u8, 2, u8::MAX] {
            let mut bytes = sample_header().to_bytes();
            bytes[4] = version;
            assert!(validate_header(&bytes).unwrap_err().is_format());
        }
    }

    #[test]
    fn test_unknown_algorithm_ids() {
        let mut bytes = sample_header().to_bytes();
        bytes[5] = 9;
        assert!(validate_header(&bytes).unwrap_err().is_format());

        let mut bytes = sample_header().to_bytes();
        bytes[11] = 0;
        assert!(validate_header(&bytes).unwrap_err().is_format());
    }

    #[test]
    fn test_work_factor_bounds() {
        let mut bytes = sample_header().to_bytes();
        bytes[6..10].copy_from_slice(&0u32.to_be_bytes());
        assert!(validate_header(&bytes).unwrap_err().is_format());

        let mut bytes = sample_header().to_bytes();
        bytes[6..10].copy_from_slice(&(MAX_PBKDF2_ITERATIONS + 1).to_be_bytes());
        assert!(validate_header(&bytes).unwrap_err().is_resource());

        let mut bytes = sample_header().to_bytes();
        bytes[5] = HashAlgorithm::Argon2id.id();
        bytes[6..10].copy_from_slice(&(ARGON2_MAX_MEM_COST_KIB + 1).to_be_bytes());
        assert!(validate_header(&bytes).unwrap_err().is_resource());
    }

    #[test]
    fn test_salt_length_bounds() {
        for salt_len in [0u8, 7, 65, u8::MAX] {
            let mut bytes = sample_header().to_bytes();
            bytes[10] = salt_len;
            assert!(validate_header(&bytes).unwrap_err().is_format());
        }
    }

    #[test]
    fn test_segment_size_bounds() {
        let mut bytes = sample_header().to_bytes();
        bytes[12..16].copy_from_slice(&(MIN_SEGMENT_SIZE - 1).to_be_bytes());
        assert!(validate_header(&bytes).unwrap_err().is_format());

        let mut bytes = sample_header().to_bytes();
        bytes[12..16].copy_from_slice(&(MAX_SEGMENT_SIZE + 1).to_be_bytes());
        assert!(validate_header(&bytes).unwrap_err().is_resource());
    }

    #[test]
    fn test_write_refuses_invalid_header() {
        let mut header = sample_header();
        header.hash.salt_len = 0;
        let mut out = Vec::new();
        assert!(header.write_to(&mut out).unwrap_err().is_format());
        assert!(out.is_empty());
    }
}
