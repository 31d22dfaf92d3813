use std::io;

use thiserror::Error;

pub type SymResult<T> = Result<T, SymError>;

#[derive(Debug, Error)]
pub enum SymError {
    /// Malformed container: bad magic/version/metadata, broken armor,
    /// truncated stream.
    #[error("format error: {0}")]
    Format(String),

    /// AEAD tag mismatch. Wrong password and tampering are deliberately
    /// indistinguishable.
    #[error("authentication failed: wrong password or corrupted data")]
    Authentication,

    /// Counter exhaustion, or a header asking for more work than we allow.
    #[error("resource error: {0}")]
    Resource(String),

    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl SymError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        SymError::Format(msg.into())
    }

    pub(crate) fn resource(msg: impl Into<String>) -> Self {
        SymError::Resource(msg.into())
    }

    pub fn is_format(&self) -> bool {
        matches!(self, SymError::Format(_))
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, SymError::Authentication)
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, SymError::Resource(_))
    }
}

/// `Read`/`Write` impls smuggle a `SymError` inside an `io::Error`; this
/// unwraps it again so callers see the original variant. Any other I/O error
/// is kept as is.
impl From<io::Error> for SymError {
    fn from(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<SymError>()) {
            return SymError::Io(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<SymError>()) {
            Some(Ok(sym)) => *sym,
            Some(Err(other)) => SymError::Io(io::Error::new(kind, other)),
            None => SymError::Io(io::Error::from(kind)),
        }
    }
}

impl From<SymError> for io::Error {
    fn from(err: SymError) -> Self {
        match err {
            SymError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sym_error_survives_io_roundtrip() {
        let io_err: io::Error = SymError::Authentication.into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);

        let back = SymError::from(io_err);
        assert!(back.is_authentication());
    }

    #[test]
    fn test_format_error_survives_io_roundtrip() {
        let io_err: io::Error = SymError::format("bad magic").into();
        match SymError::from(io_err) {
            SymError::Format(msg) => assert_eq!(msg, "bad magic"),
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_io_error_passes_through() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        match SymError::from(io_err) {
            SymError::Io(e) => {
                assert_eq!(e.kind(), io::ErrorKind::BrokenPipe);
                assert_eq!(e.to_string(), "pipe closed");
            }
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn test_io_variant_unwraps_to_original() {
        let original = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let io_err: io::Error = SymError::Io(original).into();
        assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
    }
}
