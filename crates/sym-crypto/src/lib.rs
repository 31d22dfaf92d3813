//! sym-crypto: password-based streaming file encryption
//!
//! Architecture: segmented AEAD over a self-describing container
//!
//! Pipeline: password + salt → KDF → 256-bit key → seal fixed-size segments → (optional) armor
//!
//! Container layout:
//! ```text
//! [16 bytes: header (magic, version, KDF params, cipher params)]
//! [salt_len bytes: random salt]
//! [segment 1 .. segment n-1: segment_size bytes each, flag = 0]
//! [segment n: 16..=segment_size bytes, flag = 1]
//!   nonce = counter (96-bit BE), AAD = nonce || flag
//! ```

pub mod armor;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod kdf;
pub mod segment;
pub mod stream;

use std::io::{self, BufReader, Read, Write};

use secrecy::SecretString;

pub use armor::{detect_encoding, ArmorReader, ArmorWriter, Encoding};
pub use cache::PasswordCache;
pub use config::{EncryptConfig, LogConfig, SymConfig};
pub use error::{SymError, SymResult};
pub use format::{validate_header, EncryptionParams, Header};
pub use kdf::{derive_key, DerivedKey, HashAlgorithm, HashParams};
pub use segment::EncryptionAlgorithm;
pub use stream::{DecryptingReader, EncryptingWriter};

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AEAD nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of an AEAD authentication tag
pub const TAG_SIZE: usize = 16;

/// First byte of every binary container
pub const BINARY_MARKER: u8 = format::MAGIC[0];

/// First byte of every armored container (and of each banner line)
pub const ARMOR_MARKER: u8 = b'-';

/// Encrypt everything `source` yields into a complete container on `sink`.
///
/// Parameters come from `config`; the salt is fresh for every call.
pub fn encrypt<W: Write, R: Read>(
    mut sink: W,
    mut source: R,
    password: &SecretString,
    config: &EncryptConfig,
) -> SymResult<()> {
    let header = config.header()?;

    if config.armor {
        let mut armored = ArmorWriter::new(&mut sink)?;
        seal_into(&mut armored, &mut source, password, &header)?;
        armored.finish()?;
    } else {
        seal_into(&mut sink, &mut source, password, &header)?;
    }
    sink.flush()?;
    Ok(())
}

fn seal_into<W: Write, R: Read>(
    mut out: W,
    source: &mut R,
    password: &SecretString,
    header: &Header,
) -> SymResult<()> {
    header.write_to(&mut out)?;
    let mut writer = EncryptingWriter::new(&mut out, password, header)?;
    let n = io::copy(source, &mut writer)?;
    writer.finish()?;
    tracing::debug!(bytes = n, "encrypted stream");
    Ok(())
}

/// Decrypt a binary or armored container from `source` into `sink`.
///
/// Returns the number of plaintext bytes written. Keys are looked up in (and
/// added to) `cache` by salt, so containers from one batch derive once.
/// Plaintext is written segment by segment as each one verifies; on error
/// `sink` may hold the verified prefix and should be discarded.
pub fn decrypt<W: Write, R: Read>(
    mut sink: W,
    source: R,
    password: &SecretString,
    cache: &mut PasswordCache,
) -> SymResult<u64> {
    let mut source = BufReader::new(source);
    let n = match detect_encoding(&mut source)? {
        Encoding::Binary => open_into(&mut sink, source, password, cache)?,
        Encoding::Armored => open_into(&mut sink, ArmorReader::new(source), password, cache)?,
    };
    sink.flush()?;
    Ok(n)
}

fn open_into<W: Write, R: Read>(
    sink: &mut W,
    mut source: R,
    password: &SecretString,
    cache: &mut PasswordCache,
) -> SymResult<u64> {
    let header = Header::read_from(&mut source)?;
    let salt = stream::read_salt(&mut source, &header)?;
    let key = cache.get_or_derive(password, &salt, &header.hash)?;

    let mut reader = DecryptingReader::with_key(source, &key, &header.encryption);
    let n = io::copy(&mut reader, sink)?;
    tracing::debug!(bytes = n, "decrypted stream");
    Ok(n)
}
