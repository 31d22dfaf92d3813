//! ASCII armor: banner lines + line-wrapped base64 around a binary container
//!
//! ```text
//! -------------------------- Begin encrypted text block --------------------------
//! -------------------------- am i cool like gpg? ---------------------------------
//! gHN5bQEC...   (80 columns of standard padded base64 per line)
//! ...
//! ```
//!
//! Decoding drops every line that starts with `-`, strips line breaks and
//! streams the rest through a base64 decoder, so line lengths are arbitrary
//! and memory use does not grow with them.

use std::io::{self, BufRead, Read, Write};

use base64::engine::general_purpose::{GeneralPurpose, STANDARD};
use base64::read::DecoderReader;
use base64::write::EncoderWriter;

use crate::error::{SymError, SymResult};
use crate::{ARMOR_MARKER, BINARY_MARKER};

pub const BANNER: &str = "\
-------------------------- Begin encrypted text block --------------------------
-------------------------- am i cool like gpg? ---------------------------------
";

/// Base64 characters per armored line.
pub const LINE_WIDTH: usize = 80;

/// How a container is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Binary,
    Armored,
}

/// Peek at the first byte of `r` to pick the decoding path. Nothing is
/// consumed.
pub fn detect_encoding<R: BufRead>(r: &mut R) -> SymResult<Encoding> {
    let first = loop {
        match r.fill_buf() {
            Ok(buf) => break buf.first().copied(),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    };
    match first {
        None => Err(SymError::format("no input")),
        Some(BINARY_MARKER) => Ok(Encoding::Binary),
        Some(ARMOR_MARKER) => Ok(Encoding::Armored),
        Some(other) => Err(SymError::format(format!(
            "invalid input: unexpected leading byte {other:#04x}"
        ))),
    }
}

/// Inserts a line break after every [`LINE_WIDTH`] bytes written through it.
pub struct LineWrapper<W: Write> {
    inner: W,
    column: usize,
}

impl<W: Write> LineWrapper<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, column: 0 }
    }

    /// Terminate a partial last line and flush.
    pub fn finish(mut self) -> io::Result<W> {
        if self.column > 0 {
            self.inner.write_all(b"\n")?;
            self.column = 0;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for LineWrapper<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            let take = (LINE_WIDTH - self.column).min(rest.len());
            self.inner.write_all(&rest[..take])?;
            self.column += take;
            rest = &rest[take..];
            if self.column == LINE_WIDTH {
                self.inner.write_all(b"\n")?;
                self.column = 0;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Armoring sink: banner on construction, wrapped base64 after.
pub struct ArmorWriter<W: Write> {
    encoder: EncoderWriter<'static, GeneralPurpose, LineWrapper<W>>,
}

impl<W: Write> ArmorWriter<W> {
    pub fn new(mut inner: W) -> io::Result<Self> {
        inner.write_all(BANNER.as_bytes())?;
        Ok(Self {
            encoder: EncoderWriter::new(LineWrapper::new(inner), &STANDARD),
        })
    }

    /// Encode the final partial group, end the last line and return the sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.encoder.finish()?.finish()
    }
}

impl<W: Write> Write for ArmorWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

/// Yields the bytes of every line that does not start with [`ARMOR_MARKER`],
/// without line terminators.
pub struct LineFilter<R: BufRead> {
    inner: R,
    at_line_start: bool,
    skipping: bool,
}

impl<R: BufRead> LineFilter<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            at_line_start: true,
            skipping: false,
        }
    }
}

impl<R: BufRead> Read for LineFilter<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                return Ok(0);
            }

            let mut consumed = 0;
            let mut written = 0;
            for &byte in available {
                if written == out.len() {
                    break;
                }
                consumed += 1;
                match byte {
                    b'\n' => {
                        self.at_line_start = true;
                        self.skipping = false;
                    }
                    b'\r' => {}
                    _ if self.skipping => {}
                    ARMOR_MARKER if self.at_line_start => {
                        self.skipping = true;
                        self.at_line_start = false;
                    }
                    _ => {
                        self.at_line_start = false;
                        out[written] = byte;
                        written += 1;
                    }
                }
            }
            self.inner.consume(consumed);

            if written > 0 {
                return Ok(written);
            }
        }
    }
}

/// De-armoring source: the binary container inside an armored stream.
pub struct ArmorReader<R: BufRead> {
    decoder: DecoderReader<'static, GeneralPurpose, LineFilter<R>>,
}

impl<R: BufRead> ArmorReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            decoder: DecoderReader::new(LineFilter::new(inner), &STANDARD),
        }
    }
}

impl<R: BufRead> Read for ArmorReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder.read(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::InvalidData {
                SymError::format(format!("invalid armor encoding: {e}")).into()
            } else {
                e
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armor(data: &[u8]) -> String {
        let mut writer = ArmorWriter::new(Vec::new()).unwrap();
        writer.write_all(data).unwrap();
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    fn dearmor(text: &[u8]) -> SymResult<Vec<u8>> {
        let mut out = Vec::new();
        ArmorReader::new(text).read_to_end(&mut out)?;
        Ok(out)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn test_armor_roundtrip_lengths() {
        // Straddle the 3-byte base64 group and the 60-byte (80-column) line
        for len in [0, 1, 2, 3, 4, 5, 58, 59, 60, 61, 62, 119, 120, 121, 1000] {
            let data = pattern(len);
            assert_eq!(dearmor(armor(&data).as_bytes()).unwrap(), data, "length {len}");
        }
    }

    #[test]
    fn test_armor_layout() {
        let text = armor(&pattern(150));
        let lines: Vec<&str> = text.lines().collect();

        assert!(text.starts_with(BANNER));
        assert!(text.ends_with('\n'));
        assert_eq!(lines.len(), 2 + 3);
        assert_eq!(lines[2].len(), LINE_WIDTH);
        assert_eq!(lines[3].len(), LINE_WIDTH);
        assert_eq!(lines[4].len(), 200 - 2 * LINE_WIDTH);
    }

    #[test]
    fn test_exact_line_has_single_trailing_newline() {
        let text = armor(&pattern(60));
        assert!(text.ends_with("\n"));
        assert!(!text.ends_with("\n\n"));
    }

    #[test]
    fn test_empty_input_is_banner_only() {
        assert_eq!(armor(b""), BANNER);
    }

    #[test]
    fn test_arbitrary_line_lengths() {
        let data = pattern(100);
        let text = armor(&data);
        let body: String = text
            .lines()
            .filter(|l| !l.starts_with('-'))
            .collect::<Vec<_>>()
            .concat();

        // One long line, no trailing newline
        let one_line = format!("{BANNER}{body}");
        assert_eq!(dearmor(one_line.as_bytes()).unwrap(), data);

        // Ragged lines with CRLF and interleaved comments
        let mut ragged = String::from(BANNER);
        for (i, ch) in body.chars().enumerate() {
            ragged.push(ch);
            if i % 7 == 3 {
                ragged.push_str("\r\n");
            }
            if i == 50 {
                ragged.push_str("\n- a comment line\n");
            }
        }
        assert_eq!(dearmor(ragged.as_bytes()).unwrap(), data);
    }

    #[test]
    fn test_invalid_base64_is_format_error() {
        let text = format!("{BANNER}gHN5bQ!!\n");
        let err = dearmor(text.as_bytes()).unwrap_err();
        assert!(err.is_format(), "got {err:?}");
    }

    #[test]
    fn test_dash_inside_line_is_not_a_comment() {
        let text = format!("{BANNER}gHN5-bQE=\n");
        assert!(dearmor(text.as_bytes()).unwrap_err().is_format());
    }

    #[test]
    fn test_detect_encoding() {
        assert_eq!(detect_encoding(&mut &[0x80u8, 1, 2][..]).unwrap(), Encoding::Binary);
        assert_eq!(detect_encoding(&mut &b"---"[..]).unwrap(), Encoding::Armored);
        assert!(detect_encoding(&mut &b""[..]).unwrap_err().is_format());
        assert!(detect_encoding(&mut &b"hello"[..]).unwrap_err().is_format());
    }

    #[test]
    fn test_detect_does_not_consume() {
        let data = [0x80u8, b's', b'y', b'm'];
        let mut reader = &data[..];
        detect_encoding(&mut reader).unwrap();
        assert_eq!(reader, &data[..]);
    }
}
