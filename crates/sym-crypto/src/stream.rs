//! Streaming segment encryption
//!
//! [`EncryptingWriter`] buffers plaintext into `segment_size - 16` byte
//! segments and seals each one as soon as it is full. [`EncryptingWriter::finish`]
//! seals whatever is left, possibly nothing, as the final segment, so an input
//! that is an exact multiple of the segment capacity ends with an empty final
//! segment.
//!
//! [`DecryptingReader`] cannot tell a full final segment from a full
//! non-final one by length, so it over-reads by one byte: `segment_size + 1`
//! bytes means more data follows (the extra byte is kept for the next
//! segment), anything shorter is the final segment.
//!
//! Memory use is one segment buffer per stream, independent of input size.

use std::io::{self, Read, Write};

use rand::RngCore;
use secrecy::SecretString;

use crate::error::{SymError, SymResult};
use crate::format::{read_exact_or_truncated, EncryptionParams, Header};
use crate::kdf::{derive_key, DerivedKey};
use crate::segment::SegmentCipher;
use crate::TAG_SIZE;

/// Sealing sink. Writes the salt on construction, then sealed segments.
///
/// Call [`finish`](Self::finish) to seal the final segment and surface any
/// error. Dropping an unfinished writer still seals the final segment so that
/// every exit path leaves a terminated container, but errors from that
/// attempt can only be logged.
pub struct EncryptingWriter<W: Write> {
    inner: W,
    cipher: SegmentCipher,
    buffer: Vec<u8>,
    capacity: usize,
    finished: bool,
    /// Set when a write to `inner` failed; the output is then unusable and
    /// nothing more is written to it.
    poisoned: bool,
}

impl<W: Write> EncryptingWriter<W> {
    /// Generate a fresh salt, derive the key and write the salt to `inner`.
    ///
    /// The header itself is written by the caller, before this.
    pub fn new(mut inner: W, password: &SecretString, header: &Header) -> SymResult<Self> {
        header.validate()?;

        let mut salt = vec![0u8; header.hash.salt_len as usize];
        rand::thread_rng().fill_bytes(&mut salt);

        let key = derive_key(password, &salt, &header.hash)?;
        inner.write_all(&salt)?;

        Ok(Self::with_key(inner, &key, &header.encryption))
    }

    /// Start sealing with an already derived key. Nothing is written yet.
    pub fn with_key(inner: W, key: &DerivedKey, params: &EncryptionParams) -> Self {
        let capacity = params.plaintext_capacity();
        Self {
            inner,
            cipher: SegmentCipher::new(params.algorithm, key),
            buffer: Vec::with_capacity(capacity + TAG_SIZE),
            capacity,
            finished: false,
            poisoned: false,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Seal the buffered remainder as the final segment.
    ///
    /// Idempotent; writes after a successful finish fail.
    pub fn finish(&mut self) -> SymResult<()> {
        if self.finished {
            return Ok(());
        }
        if self.poisoned {
            return Err(SymError::Io(io::Error::other(
                "earlier write to the output failed",
            )));
        }
        self.seal_buffer(true)?;
        self.finished = true;
        self.inner.flush()?;
        tracing::debug!(segments = %self.cipher.segments(), "sealed final segment");
        Ok(())
    }

    fn seal_buffer(&mut self, last: bool) -> SymResult<()> {
        self.cipher.seal_in_place(&mut self.buffer, last)?;
        if let Err(e) = self.inner.write_all(&self.buffer) {
            self.poisoned = true;
            return Err(SymError::Io(e));
        }
        self.buffer.clear();
        Ok(())
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.poisoned {
            return Err(io::Error::other("earlier write to the output failed"));
        }
        if self.finished {
            return Err(io::Error::other("write after finish"));
        }
        let mut written = 0;
        while written < buf.len() {
            let take = (self.capacity - self.buffer.len()).min(buf.len() - written);
            self.buffer.extend_from_slice(&buf[written..written + take]);
            written += take;
            if self.buffer.len() == self.capacity {
                self.seal_buffer(false)?;
            }
        }
        Ok(written)
    }

    /// Flushes `inner`. Buffered plaintext stays buffered until its segment
    /// is full or the writer is finished.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Drop for EncryptingWriter<W> {
    fn drop(&mut self) {
        if self.finished || self.poisoned {
            return;
        }
        tracing::warn!("encrypting writer dropped without finish, sealing final segment");
        if let Err(e) = self.finish() {
            tracing::warn!("sealing final segment on drop failed: {e}");
        }
    }
}

/// Opening source. A lazy, finite, non-restartable stream of verified
/// plaintext.
///
/// Only plaintext from segments that passed authentication is ever returned.
/// After any error the reader is poisoned and keeps failing.
pub struct DecryptingReader<R: Read> {
    inner: R,
    cipher: SegmentCipher,
    segment_size: usize,
    /// Ciphertext while filling, plaintext after a successful open.
    segment: Vec<u8>,
    pos: usize,
    lookahead: Option<u8>,
    finished: bool,
    /// Kind of the error that stopped the stream.
    poisoned: Option<io::ErrorKind>,
}

impl<R: Read> DecryptingReader<R> {
    /// Read the salt that follows an already parsed header and derive the key.
    pub fn new(mut inner: R, password: &SecretString, header: &Header) -> SymResult<Self> {
        header.validate()?;
        let salt = read_salt(&mut inner, header)?;
        let key = derive_key(password, &salt, &header.hash)?;
        Ok(Self::with_key(inner, &key, &header.encryption))
    }

    /// Open segments with an already derived key. `inner` must be positioned
    /// at the first segment.
    pub fn with_key(inner: R, key: &DerivedKey, params: &EncryptionParams) -> Self {
        let segment_size = params.segment_size as usize;
        Self {
            inner,
            cipher: SegmentCipher::new(params.algorithm, key),
            segment_size,
            segment: Vec::with_capacity(segment_size + 1),
            pos: 0,
            lookahead: None,
            finished: false,
            poisoned: None,
        }
    }

    /// Load and open the next segment. Returns `false` once the final
    /// segment has been consumed.
    fn next_segment(&mut self) -> SymResult<bool> {
        if self.finished {
            return Ok(false);
        }

        self.segment.clear();
        self.pos = 0;
        self.segment.extend(self.lookahead.take());

        let want = self.segment_size + 1;
        let missing = (want - self.segment.len()) as u64;
        (&mut self.inner).take(missing).read_to_end(&mut self.segment)?;

        let last = match self.segment.len() {
            n if n == want => {
                self.lookahead = self.segment.pop();
                false
            }
            0 => return Err(SymError::format("stream ended before the final segment")),
            n if n < TAG_SIZE => {
                return Err(SymError::format(format!("truncated segment of {n} bytes")))
            }
            _ => true,
        };

        self.cipher.open_in_place(&mut self.segment, last)?;
        if last {
            self.finished = true;
            tracing::debug!(segments = %self.cipher.segments(), "opened final segment");
        }
        Ok(true)
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.poisoned {
            None => {}
            Some(io::ErrorKind::InvalidData) => {
                return Err(SymError::format("stream failed earlier and cannot continue").into());
            }
            Some(kind) => {
                return Err(io::Error::new(kind, "read failed earlier and cannot continue"));
            }
        }
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos == self.segment.len() {
            match self.next_segment() {
                Ok(true) => {}
                Ok(false) => return Ok(0),
                Err(e) => {
                    let err: io::Error = e.into();
                    self.poisoned = Some(err.kind());
                    self.segment.clear();
                    self.pos = 0;
                    return Err(err);
                }
            }
        }
        let n = (self.segment.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.segment[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Read the salt declared by `header`.
pub(crate) fn read_salt<R: Read>(r: &mut R, header: &Header) -> SymResult<Vec<u8>> {
    let mut salt = vec![0u8; header.hash.salt_len as usize];
    read_exact_or_truncated(r, &mut salt, "salt")?;
    Ok(salt)
}
